mod engine;
mod error;
mod strategy;

pub use engine::AggregationEngine;
pub use error::{AggregationErr, Result};
pub use strategy::{AggStrategy, FedAvg, aggregate, check_schema};
