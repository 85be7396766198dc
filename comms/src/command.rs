use std::{fmt, str::FromStr};

use crate::ChannelErr;

/// The fixed ASCII command vocabulary spoken between coordinator and clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Retrieve the current snapshot.
    Retr,
    /// Commit the locally trained update.
    Comm,
    /// The peer is about to release the connection.
    Close,
    Ack,
    Send,
    Ok,
}

impl Command {
    /// Returns the wire representation of the command.
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Retr => "RETR",
            Command::Comm => "COMM",
            Command::Close => "CLOSE",
            Command::Ack => "ACK",
            Command::Send => "SEND",
            Command::Ok => "OK",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = ChannelErr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RETR" => Ok(Command::Retr),
            "COMM" => Ok(Command::Comm),
            "CLOSE" => Ok(Command::Close),
            "ACK" => Ok(Command::Ack),
            "SEND" => Ok(Command::Send),
            "OK" => Ok(Command::Ok),
            other => Err(ChannelErr::UnknownCommand(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_vocabulary() {
        let all = [
            Command::Retr,
            Command::Comm,
            Command::Close,
            Command::Ack,
            Command::Send,
            Command::Ok,
        ];

        for cmd in all {
            assert_eq!(cmd.as_str().parse::<Command>().unwrap(), cmd);
        }
    }

    #[test]
    fn test_parse_is_case_sensitive() {
        let err = "ack".parse::<Command>().unwrap_err();
        assert!(matches!(err, ChannelErr::UnknownCommand(s) if s == "ack"));
    }
}
