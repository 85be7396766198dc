use std::{
    error::Error,
    fmt::{self, Display},
};

use model::PayloadErr;

use crate::storage::StoreErr;

/// The specific result type of the aggregation module.
pub type Result<T> = std::result::Result<T, AggregationErr>;

/// Every way an aggregation attempt can fail.
///
/// None of these are fatal to a run: the pending updates are kept and the next
/// attempt retries them.
#[derive(Debug)]
pub enum AggregationErr {
    EmptyBatch,
    SchemaMismatch { tensor: String, detail: String },
    Payload { client: Option<usize>, source: PayloadErr },
    Store(StoreErr),
}

impl AggregationErr {
    pub(super) fn mismatch(tensor: &str, detail: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            tensor: tensor.to_string(),
            detail: detail.into(),
        }
    }
}

impl Display for AggregationErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregationErr::EmptyBatch => f.write_str("no updates to aggregate"),
            AggregationErr::SchemaMismatch { tensor, detail } => {
                write!(f, "schema mismatch at tensor {tensor:?}: {detail}")
            }
            AggregationErr::Payload {
                client: Some(client),
                source,
            } => write!(f, "invalid update from client {client}: {source}"),
            AggregationErr::Payload {
                client: None,
                source,
            } => write!(f, "invalid snapshot payload: {source}"),
            AggregationErr::Store(e) => write!(f, "could not publish aggregate: {e}"),
        }
    }
}

impl Error for AggregationErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AggregationErr::Payload { source, .. } => Some(source),
            AggregationErr::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreErr> for AggregationErr {
    fn from(value: StoreErr) -> Self {
        Self::Store(value)
    }
}
