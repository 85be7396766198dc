use log::debug;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{ChannelErr, Command, DEFAULT_MAX_FRAME_LEN, LEN_TYPE_SIZE, LenType, Result};

/// The receiving end handle of the communication.
pub struct FrameReceiver<R: AsyncRead + Unpin> {
    rx: R,
    max_len: usize,
}

impl<R: AsyncRead + Unpin> FrameReceiver<R> {
    /// Creates a new `FrameReceiver` bounded by `DEFAULT_MAX_FRAME_LEN`.
    ///
    /// # Arguments
    /// * `rx` - The underlying reader.
    pub fn new(rx: R) -> Self {
        Self {
            rx,
            max_len: DEFAULT_MAX_FRAME_LEN,
        }
    }

    /// Replaces the maximum accepted frame length.
    pub fn with_max_frame_len(mut self, max_len: usize) -> Self {
        self.max_len = max_len;
        self
    }

    /// Waits for a whole frame and returns its payload.
    ///
    /// Partial reads are accumulated until the declared length is satisfied.
    ///
    /// # Returns
    /// The payload bytes, `ChannelErr::ConnectionClosed` if the stream ends first or
    /// `ChannelErr::FrameTooLarge` if the declared length exceeds the bound.
    pub async fn receive(&mut self) -> Result<Vec<u8>> {
        let mut size_buf = [0; LEN_TYPE_SIZE];
        self.rx.read_exact(&mut size_buf).await?;
        let len = LenType::from_be_bytes(size_buf) as usize;

        if len > self.max_len {
            return Err(ChannelErr::FrameTooLarge {
                len,
                max: self.max_len,
            });
        }

        let mut payload = vec![0; len];
        self.rx.read_exact(&mut payload).await?;
        Ok(payload)
    }

    /// Receives a frame and parses it as a command.
    pub async fn receive_command(&mut self) -> Result<Command> {
        let payload = self.receive().await?;
        let text = String::from_utf8_lossy(&payload);
        let cmd = text.parse()?;
        debug!(command = &*text; "received command");
        Ok(cmd)
    }

    /// Receives a frame that must be an `ACK`.
    ///
    /// # Returns
    /// `ChannelErr::Protocol` if anything else arrives.
    pub async fn receive_ack(&mut self) -> Result<()> {
        self.expect(Command::Ack).await
    }

    /// Receives a frame that must be exactly `expected`.
    pub async fn expect(&mut self, expected: Command) -> Result<()> {
        let payload = self.receive().await?;
        if payload == expected.as_str().as_bytes() {
            return Ok(());
        }

        Err(ChannelErr::Protocol {
            expected,
            got: String::from_utf8_lossy(&payload).into_owned(),
        })
    }

    /// Receives a frame and deserializes it from UTF-8 JSON.
    pub async fn receive_json<T: DeserializeOwned>(&mut self) -> Result<T> {
        let payload = self.receive().await?;
        Ok(serde_json::from_slice(&payload)?)
    }
}
