//! The sending end of the length-prefixed protocol.

use log::debug;
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::{ChannelErr, Command, LEN_TYPE_SIZE, LenType, Result};

/// The sending end handle of the communication.
pub struct FrameSender<W>
where
    W: AsyncWrite + Unpin,
{
    tx: W,
    buf: Vec<u8>,
}

impl<W: AsyncWrite + Unpin> FrameSender<W> {
    /// Creates a new `FrameSender` instance.
    ///
    /// # Arguments
    /// * `tx` - The underlying writer.
    pub fn new(tx: W) -> Self {
        Self {
            tx,
            buf: Vec::new(),
        }
    }

    /// Writes the 4 byte big endian length of `payload` followed by the payload itself.
    ///
    /// # Arguments
    /// * `payload` - The raw bytes to send, may be empty.
    ///
    /// # Returns
    /// A `ChannelErr` if the payload doesn't fit the length prefix or the write fails.
    pub async fn send(&mut self, payload: &[u8]) -> Result<()> {
        let len = LenType::try_from(payload.len()).map_err(|_| ChannelErr::FrameTooLarge {
            len: payload.len(),
            max: LenType::MAX as usize,
        })?;

        let Self { tx, buf } = self;

        buf.clear();
        buf.reserve(LEN_TYPE_SIZE);
        buf.extend_from_slice(&len.to_be_bytes());

        tx.write_all(buf).await?;
        if !payload.is_empty() {
            tx.write_all(payload).await?;
        }

        tx.flush().await?;
        Ok(())
    }

    /// Sends `cmd` as its ASCII representation.
    pub async fn send_command(&mut self, cmd: Command) -> Result<()> {
        debug!(command = cmd.as_str(); "sending command");
        self.send(cmd.as_str().as_bytes()).await
    }

    /// Shorthand for sending an `ACK` command.
    pub async fn send_ack(&mut self) -> Result<()> {
        self.send_command(Command::Ack).await
    }

    /// Serializes `value` as UTF-8 JSON and sends it as a single frame.
    pub async fn send_json<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.send(&bytes).await
    }

    /// Shuts the writing half down, ignoring failures of an already broken stream.
    pub async fn shutdown(&mut self) {
        if let Err(e) = self.tx.shutdown().await {
            debug!("shutdown of an already closed stream: {e}");
        }
    }
}
