mod simulation;

pub use simulation::{SimulationConfig, TransportConfig};
