pub mod configs;
pub mod error;
pub mod jobs;
pub mod scheduler;
mod simulation;
pub mod transport;

pub use configs::{SimulationConfig, TransportConfig};
pub use error::{ConfigErr, LinkErr, SchedulerErr};
pub use scheduler::{Evaluator, RoundScheduler, RunReport};
pub use simulation::{run_on_listener, run_simulation};
