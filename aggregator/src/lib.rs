pub mod aggregation;
pub mod storage;

pub use aggregation::{AggStrategy, AggregationEngine, AggregationErr, FedAvg, aggregate};
pub use storage::{
    Backend, FsBackend, GlobalSnapshot, MemoryBackend, ModelUpdate, Slot, StoreErr, UpdateStore,
};
