use std::{
    error::Error,
    fmt::{self, Display},
};

use safetensors::SafeTensorError;

/// Failures while reading or writing a tensor archive.
#[derive(Debug)]
pub enum PayloadErr {
    Format(SafeTensorError),
    UnsupportedDtype { name: String, dtype: String },
    SizeMismatch {
        name: String,
        got: usize,
        expected: usize,
    },
}

impl Display for PayloadErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadErr::Format(e) => write!(f, "malformed tensor archive: {e}"),
            PayloadErr::UnsupportedDtype { name, dtype } => {
                write!(f, "tensor {name:?} has unsupported dtype {dtype}, expected F32")
            }
            PayloadErr::SizeMismatch {
                name,
                got,
                expected,
            } => write!(
                f,
                "tensor {name:?} holds {got} values but its shape requires {expected}"
            ),
        }
    }
}

impl Error for PayloadErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PayloadErr::Format(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SafeTensorError> for PayloadErr {
    fn from(value: SafeTensorError) -> Self {
        Self::Format(value)
    }
}

/// Failures raised by a `Model` implementation.
#[derive(Debug)]
pub enum ModelErr {
    Payload(PayloadErr),
    InvalidParams(String),
    /// Any failure of the underlying numeric backend.
    Backend(String),
}

impl Display for ModelErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelErr::Payload(e) => write!(f, "model payload error: {e}"),
            ModelErr::InvalidParams(msg) => write!(f, "invalid model parameters: {msg}"),
            ModelErr::Backend(msg) => write!(f, "model backend error: {msg}"),
        }
    }
}

impl Error for ModelErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ModelErr::Payload(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PayloadErr> for ModelErr {
    fn from(value: PayloadErr) -> Self {
        Self::Payload(value)
    }
}
