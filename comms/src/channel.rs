use log::debug;
use serde::{Serialize, de::DeserializeOwned};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::{Command, FrameReceiver, FrameSender, Result};

/// Both ends of a framed connection held together.
pub struct Channel<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    rx: FrameReceiver<R>,
    tx: FrameSender<W>,
}

impl<R, W> Channel<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Creates a new `Channel` from its two halves.
    pub fn new(rx: FrameReceiver<R>, tx: FrameSender<W>) -> Self {
        Self { rx, tx }
    }

    /// Bounds the declared length of incoming frames.
    pub fn with_max_frame_len(self, max_len: usize) -> Self {
        Self {
            rx: self.rx.with_max_frame_len(max_len),
            tx: self.tx,
        }
    }

    pub async fn send(&mut self, payload: &[u8]) -> Result<()> {
        self.tx.send(payload).await
    }

    pub async fn receive(&mut self) -> Result<Vec<u8>> {
        self.rx.receive().await
    }

    pub async fn send_command(&mut self, cmd: Command) -> Result<()> {
        self.tx.send_command(cmd).await
    }

    pub async fn receive_command(&mut self) -> Result<Command> {
        self.rx.receive_command().await
    }

    pub async fn send_ack(&mut self) -> Result<()> {
        self.tx.send_ack().await
    }

    pub async fn receive_ack(&mut self) -> Result<()> {
        self.rx.receive_ack().await
    }

    pub async fn expect(&mut self, expected: Command) -> Result<()> {
        self.rx.expect(expected).await
    }

    pub async fn send_json<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.tx.send_json(value).await
    }

    pub async fn receive_json<T: DeserializeOwned>(&mut self) -> Result<T> {
        self.rx.receive_json().await
    }

    /// Sends a `CLOSE` command best-effort and releases the stream.
    ///
    /// The stream is shut down and dropped whether or not the command could be written.
    pub async fn close(mut self) {
        if let Err(e) = self.tx.send_command(Command::Close).await {
            debug!("could not deliver CLOSE: {e}");
        }

        self.tx.shutdown().await;
    }
}
