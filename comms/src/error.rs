use std::{error::Error, fmt, io};

use crate::Command;

/// The comms module's result type.
pub type Result<T> = std::result::Result<T, ChannelErr>;

/// Failures of the framed transport.
#[derive(Debug)]
pub enum ChannelErr {
    /// The peer closed the stream before a whole frame was read.
    ConnectionClosed,
    /// A command other than the expected one arrived.
    Protocol { expected: Command, got: String },
    /// The frame payload is not one of the known commands.
    UnknownCommand(String),
    /// The declared frame length exceeds the receiver's bound.
    FrameTooLarge { len: usize, max: usize },
    Json(serde_json::Error),
    Io(io::Error),
}

impl ChannelErr {
    /// Whether the error means the underlying stream can no longer be used.
    pub fn is_disconnect(&self) -> bool {
        match self {
            ChannelErr::ConnectionClosed => true,
            ChannelErr::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::NotConnected
            ),
            _ => false,
        }
    }
}

impl fmt::Display for ChannelErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelErr::ConnectionClosed => f.write_str("connection closed by peer"),
            ChannelErr::Protocol { expected, got } => {
                write!(f, "protocol error: expected {expected}, got {got:?}")
            }
            ChannelErr::UnknownCommand(cmd) => write!(f, "unknown command {cmd:?}"),
            ChannelErr::FrameTooLarge { len, max } => {
                write!(f, "declared frame length {len} exceeds the maximum of {max}")
            }
            ChannelErr::Json(e) => write!(f, "json error: {e}"),
            ChannelErr::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for ChannelErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ChannelErr::Json(e) => Some(e),
            ChannelErr::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ChannelErr {
    fn from(value: io::Error) -> Self {
        match value.kind() {
            io::ErrorKind::UnexpectedEof => Self::ConnectionClosed,
            _ => Self::Io(value),
        }
    }
}

impl From<serde_json::Error> for ChannelErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

/// Boundary conversion for binaries / I/O APIs.
impl From<ChannelErr> for io::Error {
    fn from(value: ChannelErr) -> Self {
        match value {
            ChannelErr::Io(e) => e,
            ChannelErr::ConnectionClosed => {
                io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed by peer")
            }
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnects() {
        let eof = io::Error::from(io::ErrorKind::UnexpectedEof);
        assert!(ChannelErr::from(eof).is_disconnect());

        let reset = io::Error::from(io::ErrorKind::ConnectionReset);
        assert!(ChannelErr::from(reset).is_disconnect());

        let denied = io::Error::from(io::ErrorKind::PermissionDenied);
        assert!(!ChannelErr::from(denied).is_disconnect());
        assert!(!ChannelErr::UnknownCommand("NOPE".into()).is_disconnect());
    }
}
