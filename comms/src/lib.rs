mod channel;
mod command;
mod error;
mod messages;
mod receiver;
mod sender;

use tokio::io::{AsyncRead, AsyncWrite};

pub use channel::Channel;
pub use command::Command;
pub use error::{ChannelErr, Result};
pub use messages::{ClientHello, RoundInfo};
pub use receiver::FrameReceiver;
pub use sender::FrameSender;

type LenType = u32;
const LEN_TYPE_SIZE: usize = size_of::<LenType>();

/// The default upper bound for a single frame's declared length (256 MiB).
pub const DEFAULT_MAX_FRAME_LEN: usize = 256 * 1024 * 1024;

/// Creates a framed `Channel` over both halves of a byte stream.
///
/// # Arguments
/// * `rx` - An async readable.
/// * `tx` - An async writable.
///
/// # Returns
/// A bidirectional channel speaking the length-prefixed protocol.
pub fn channel<R, W>(rx: R, tx: W) -> Channel<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    Channel::new(FrameReceiver::new(rx), FrameSender::new(tx))
}
