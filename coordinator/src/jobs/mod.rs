mod http;
mod launcher;
mod queue;

pub use http::router;
pub use launcher::{JobOutcome, Launcher, ProcessLauncher, TaskLauncher};
pub use queue::{DEFAULT_PORTS, Job, JobScheduler, JobStatus};
