//! The model-facing side of the federation: the tensor archive format shared by
//! snapshots and updates, and the opaque training capability clients run.

mod capability;
mod error;
mod payload;

pub use capability::{Metrics, Model, NoopModel};
pub use error::{ModelErr, PayloadErr};
pub use payload::{Tensor, TensorMap, decode, encode};
