use std::{
    error::Error,
    fmt::{self, Display},
    io,
};

/// The specific result type of the storage module.
pub type Result<T> = std::result::Result<T, StoreErr>;

/// Error returned whenever an artifact could not be persisted or read back.
#[derive(Debug)]
pub enum StoreErr {
    Io(io::Error),
    Json(serde_json::Error),
}

impl Display for StoreErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreErr::Io(e) => write!(f, "UpdateStore error: {e}"),
            StoreErr::Json(e) => write!(f, "UpdateStore error: could not encode record: {e}"),
        }
    }
}

impl Error for StoreErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            StoreErr::Io(e) => Some(e),
            StoreErr::Json(e) => Some(e),
        }
    }
}

impl From<io::Error> for StoreErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for StoreErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}
