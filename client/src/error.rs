use std::{error::Error, fmt, io};

use comms::ChannelErr;
use model::ModelErr;

/// The client module's result type.
pub type Result<T> = std::result::Result<T, SessionErr>;

/// Client runtime failures.
#[derive(Debug)]
pub enum SessionErr {
    /// The registry refused our credentials.
    Auth(String),
    /// The registry answered, but not with what we asked for. Worth retrying.
    Transient(String),
    Http(reqwest::Error),
    Model(ModelErr),
    Credentials(io::Error),
    Channel(ChannelErr),
}

impl SessionErr {
    /// Whether the failed request may succeed if tried again later.
    pub fn is_transient(&self) -> bool {
        match self {
            SessionErr::Transient(_) => true,
            SessionErr::Http(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            _ => false,
        }
    }
}

impl fmt::Display for SessionErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionErr::Auth(msg) => write!(f, "authentication failed: {msg}"),
            SessionErr::Transient(msg) => write!(f, "registry unavailable: {msg}"),
            SessionErr::Http(e) => write!(f, "http error: {e}"),
            SessionErr::Model(e) => write!(f, "model error: {e}"),
            SessionErr::Credentials(e) => write!(f, "credential store error: {e}"),
            SessionErr::Channel(e) => write!(f, "channel error: {e}"),
        }
    }
}

impl Error for SessionErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SessionErr::Http(e) => Some(e),
            SessionErr::Model(e) => Some(e),
            SessionErr::Credentials(e) => Some(e),
            SessionErr::Channel(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for SessionErr {
    fn from(value: reqwest::Error) -> Self {
        Self::Http(value)
    }
}

impl From<ModelErr> for SessionErr {
    fn from(value: ModelErr) -> Self {
        Self::Model(value)
    }
}

impl From<ChannelErr> for SessionErr {
    fn from(value: ChannelErr) -> Self {
        Self::Channel(value)
    }
}
