pub mod credentials;
pub mod error;
pub mod registry;
pub mod retry;
pub mod session;
pub mod sim;

pub use credentials::{CredentialStore, DirCredentials, MemoryCredentials};
pub use error::{Result, SessionErr};
pub use registry::{HttpRegistry, Registry};
pub use retry::{Backoff, RetryPolicy};
pub use session::{Session, SessionState};
pub use sim::{SimReport, SimulationClient};
