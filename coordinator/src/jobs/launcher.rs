use std::{
    io::{self, Write},
    path::PathBuf,
    process::{Child, Command, Stdio},
    sync::Arc,
};

use futures::FutureExt;
use log::{error, warn};
use model::Model;
use tokio::task::JoinHandle;

use super::Job;
use crate::{RunReport, error::SchedulerErr, simulation::run_simulation};

/// How a launched job ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Finished,
    Failed,
}

/// Starts jobs and tells when they're done.
pub trait Launcher: Send + Sync {
    /// Whatever is needed to follow a running job.
    type Handle: Send;

    /// Starts `job`, serving its clients on `port`.
    fn launch(&self, job: &Job, port: u16) -> io::Result<Self::Handle>;

    /// Checks on a running job without blocking.
    ///
    /// # Returns
    /// `None` while the job is still running, how it ended otherwise.
    fn try_finish(&self, handle: &mut Self::Handle) -> Option<JobOutcome>;
}

/// Runs every job as a child process of the `simulate` binary.
///
/// The job's configuration is written to the child's stdin and the port is passed
/// as its only argument.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
}

impl ProcessLauncher {
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Launcher for ProcessLauncher {
    type Handle = Child;

    /// Spawns the child and hands its stdin to the blocking pool.
    ///
    /// The configuration is written in the background, so a child slow to read it
    /// never holds up the caller. A failed write shows up as a failed job.
    fn launch(&self, job: &Job, port: u16) -> io::Result<Child> {
        let mut config = serde_json::to_vec(&job.config)?;
        config.push(b'\n');
        let runtime = tokio::runtime::Handle::try_current().map_err(io::Error::other)?;

        let mut child = Command::new(&self.program)
            .arg(port.to_string())
            .stdin(Stdio::piped())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            let name = job.name.clone();
            runtime.spawn_blocking(move || {
                if let Err(e) = stdin.write_all(&config) {
                    warn!("could not hand its config to job {name}: {e}");
                }
            });
        }

        Ok(child)
    }

    fn try_finish(&self, child: &mut Child) -> Option<JobOutcome> {
        match child.try_wait() {
            Ok(None) => None,
            Ok(Some(status)) if status.success() => Some(JobOutcome::Finished),
            Ok(Some(status)) => {
                warn!("simulation process exited with {status}");
                Some(JobOutcome::Failed)
            }
            Err(e) => {
                error!("could not check on simulation process: {e}");
                Some(JobOutcome::Failed)
            }
        }
    }
}

/// Runs every job as a task of the current runtime.
#[derive(Clone)]
pub struct TaskLauncher {
    model: Arc<dyn Model>,
}

impl TaskLauncher {
    /// Creates a new `TaskLauncher`.
    ///
    /// # Arguments
    /// * `model` - The model every simulated client trains with.
    pub fn new(model: Arc<dyn Model>) -> Self {
        Self { model }
    }
}

impl Launcher for TaskLauncher {
    type Handle = JoinHandle<Result<RunReport, SchedulerErr>>;

    fn launch(&self, job: &Job, port: u16) -> io::Result<Self::Handle> {
        let config = job.config.clone();
        let model = Arc::clone(&self.model);
        let runtime = tokio::runtime::Handle::try_current().map_err(io::Error::other)?;

        Ok(runtime.spawn(async move { run_simulation(&config, model, port).await }))
    }

    fn try_finish(&self, handle: &mut Self::Handle) -> Option<JobOutcome> {
        if !handle.is_finished() {
            return None;
        }

        match handle.now_or_never()? {
            Ok(Ok(_)) => Some(JobOutcome::Finished),
            Ok(Err(e)) => {
                error!("simulation failed: {e}");
                Some(JobOutcome::Failed)
            }
            Err(e) => {
                error!("simulation task failed: {e}");
                Some(JobOutcome::Failed)
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::configs::SimulationConfig;

    fn job(name: &str, padding: usize) -> Job {
        let config: SimulationConfig = serde_json::from_value(serde_json::json!({
            "name": name,
            "n_clients": 1,
            "retrieve_distribution": [1.0],
            "commit_latency": [0],
            "max_rounds": 1,
            "train_params": { "padding": "x".repeat(padding) }
        }))
        .unwrap();
        Job::from(config)
    }

    fn wait_outcome(launcher: &ProcessLauncher, child: &mut Child) -> JobOutcome {
        let started = Instant::now();
        loop {
            if let Some(outcome) = launcher.try_finish(child) {
                return outcome;
            }
            assert!(started.elapsed() < Duration::from_secs(10), "child never exited");
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    #[tokio::test]
    async fn test_launch_does_not_wait_for_the_child_to_read() {
        // `sleep` never reads its stdin, a config this large can't fit in the pipe.
        let launcher = ProcessLauncher::new("sleep");

        let mut child = launcher.launch(&job("large", 1 << 20), 30).unwrap();

        assert_eq!(launcher.try_finish(&mut child), None);
        child.kill().unwrap();
        child.wait().unwrap();
    }

    #[tokio::test]
    async fn test_exit_status_decides_the_outcome() {
        let ok = ProcessLauncher::new("true");
        let mut child = ok.launch(&job("ok", 0), 8081).unwrap();
        assert_eq!(wait_outcome(&ok, &mut child), JobOutcome::Finished);

        let failing = ProcessLauncher::new("false");
        let mut child = failing.launch(&job("failing", 0), 8081).unwrap();
        assert_eq!(wait_outcome(&failing, &mut child), JobOutcome::Failed);
    }

    #[test]
    fn test_launch_needs_a_runtime() {
        let launcher = ProcessLauncher::new("true");
        assert!(launcher.launch(&job("orphan", 0), 8081).is_err());
    }
}
