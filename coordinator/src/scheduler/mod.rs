mod latency;
mod round;

pub use latency::{ClientLatencyProfile, bucket_assignment, profiles};
pub use round::{Evaluator, RoundScheduler, RunReport};
