mod backend;
mod error;
mod store;

pub use backend::{Backend, FsBackend, MemoryBackend};
pub use error::{Result, StoreErr};
pub use store::{GlobalSnapshot, ModelUpdate, Slot, UpdateStore};
