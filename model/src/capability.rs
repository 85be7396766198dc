use std::collections::BTreeMap;

use serde_json::Value;

use crate::{ModelErr, TensorMap, encode};

/// Named evaluation results, e.g. `loss` or `accuracy`.
pub type Metrics = BTreeMap<String, f64>;

/// The opaque training capability of a client.
///
/// Both methods are blocking and potentially long running, callers on an async
/// runtime are expected to move them onto a blocking thread.
pub trait Model: Send + Sync + 'static {
    /// Trains starting from the `weights` archive and returns the resulting archive.
    ///
    /// # Arguments
    /// * `weights` - A tensor archive as produced by `encode`.
    /// * `params` - Free form training parameters.
    fn train(&self, weights: &[u8], params: &Value) -> Result<Vec<u8>, ModelErr>;

    /// Evaluates the `weights` archive.
    ///
    /// # Arguments
    /// * `weights` - A tensor archive as produced by `encode`.
    /// * `params` - Free form evaluation parameters.
    fn evaluate(&self, weights: &[u8], params: &Value) -> Result<Metrics, ModelErr>;

    /// The archive a run starts from when no initial snapshot is given.
    ///
    /// Defaults to an archive without tensors, which lets the first aggregated
    /// batch define the schema.
    fn initial_weights(&self) -> Result<Vec<u8>, ModelErr> {
        Ok(encode(&TensorMap::new())?)
    }
}

/// A model that leaves the weights untouched.
///
/// Lets the coordination machinery run end to end without a numeric backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopModel;

impl Model for NoopModel {
    fn train(&self, weights: &[u8], _params: &Value) -> Result<Vec<u8>, ModelErr> {
        Ok(weights.to_vec())
    }

    fn evaluate(&self, _weights: &[u8], _params: &Value) -> Result<Metrics, ModelErr> {
        Ok(Metrics::new())
    }
}
