use std::{
    collections::{HashMap, VecDeque},
    ops::RangeInclusive,
};

use log::{error, info};
use parking_lot::Mutex;
use serde::Serialize;

use super::{JobOutcome, Launcher};
use crate::configs::SimulationConfig;

/// The ports handed out to launched jobs, in rotation.
pub const DEFAULT_PORTS: RangeInclusive<u16> = 8081..=8090;

/// A named simulation waiting for its turn.
#[derive(Debug, Clone)]
pub struct Job {
    pub name: String,
    pub config: SimulationConfig,
}

impl From<SimulationConfig> for Job {
    fn from(config: SimulationConfig) -> Self {
        Self {
            name: config.name.clone(),
            config,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Finished,
    Failed,
    NotFound,
}

impl From<JobOutcome> for JobStatus {
    fn from(value: JobOutcome) -> Self {
        match value {
            JobOutcome::Finished => Self::Finished,
            JobOutcome::Failed => Self::Failed,
        }
    }
}

struct QueueState<H> {
    queue: VecDeque<Job>,
    running: Option<(Job, H)>,
    finished: HashMap<String, JobStatus>,
    next_port: u16,
}

/// A FIFO of simulations running at most one of them at a time.
pub struct JobScheduler<L: Launcher> {
    launcher: L,
    ports: RangeInclusive<u16>,
    state: Mutex<QueueState<L::Handle>>,
}

impl<L: Launcher> JobScheduler<L> {
    /// Creates a new `JobScheduler` handing out the `DEFAULT_PORTS`.
    pub fn new(launcher: L) -> Self {
        Self::with_ports(launcher, DEFAULT_PORTS)
    }

    /// Creates a new `JobScheduler`.
    ///
    /// # Arguments
    /// * `launcher` - Starts the jobs and reports when they're done.
    /// * `ports` - The ports given to consecutive jobs, wrapping around at the end.
    pub fn with_ports(launcher: L, ports: RangeInclusive<u16>) -> Self {
        let state = QueueState {
            queue: VecDeque::new(),
            running: None,
            finished: HashMap::new(),
            next_port: *ports.start(),
        };

        Self {
            launcher,
            ports,
            state: Mutex::new(state),
        }
    }

    /// Appends `job` at the end of the queue and starts it if nothing else is running.
    pub fn submit(&self, job: Job) {
        let mut state = self.state.lock();
        info!("queued job {}", job.name);
        state.queue.push_back(job);
        self.forward_locked(&mut state);
    }

    /// Retires the running job if it exited and starts the next one in line.
    pub fn forward(&self) {
        let mut state = self.state.lock();
        self.forward_locked(&mut state);
    }

    /// Where the job named `name` stands, after forwarding the queue.
    ///
    /// When several jobs share a name, the running one wins, then the first queued,
    /// then the latest to complete.
    pub fn status(&self, name: &str) -> JobStatus {
        let mut state = self.state.lock();
        self.forward_locked(&mut state);

        if state
            .running
            .as_ref()
            .is_some_and(|(job, _)| job.name == name)
        {
            return JobStatus::Running;
        }

        if state.queue.iter().any(|job| job.name == name) {
            return JobStatus::Queued;
        }

        state
            .finished
            .get(name)
            .copied()
            .unwrap_or(JobStatus::NotFound)
    }

    fn forward_locked(&self, state: &mut QueueState<L::Handle>) {
        if let Some((_, handle)) = state.running.as_mut() {
            let Some(outcome) = self.launcher.try_finish(handle) else {
                return;
            };

            if let Some((job, _)) = state.running.take() {
                info!("job {} ended: {outcome:?}", job.name);
                state.finished.insert(job.name, outcome.into());
            }
        }

        while let Some(job) = state.queue.pop_front() {
            let port = self.next_port(state);

            match self.launcher.launch(&job, port) {
                Ok(handle) => {
                    info!("started job {} on port {port}", job.name);
                    state.running = Some((job, handle));
                    return;
                }
                Err(e) => {
                    error!("could not start job {}: {e}", job.name);
                    state.finished.insert(job.name, JobStatus::Failed);
                }
            }
        }
    }

    fn next_port(&self, state: &mut QueueState<L::Handle>) -> u16 {
        let port = state.next_port;

        state.next_port = match port.checked_add(1) {
            Some(next) if self.ports.contains(&next) => next,
            _ => *self.ports.start(),
        };

        port
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        sync::{
            Arc,
            atomic::{AtomicBool, Ordering},
        },
    };

    use super::*;

    #[derive(Clone)]
    struct Switch(Arc<AtomicBool>);

    impl Switch {
        fn flip(&self) {
            self.0.store(true, Ordering::Release);
        }
    }

    /// Jobs run until their switch is flipped; names starting with `bad` can't launch.
    #[derive(Default)]
    struct MockLauncher {
        launched: Mutex<Vec<(String, u16, Switch)>>,
    }

    impl MockLauncher {
        fn switch(&self, name: &str) -> Switch {
            let launched = self.launched.lock();
            let (_, _, switch) = launched.iter().rev().find(|(n, ..)| n == name).unwrap();
            switch.clone()
        }

        fn ports(&self) -> Vec<u16> {
            self.launched.lock().iter().map(|(_, port, _)| *port).collect()
        }
    }

    impl Launcher for MockLauncher {
        type Handle = Switch;

        fn launch(&self, job: &Job, port: u16) -> io::Result<Switch> {
            if job.name.starts_with("bad") {
                return Err(io::Error::other("no such binary"));
            }

            let switch = Switch(Arc::new(AtomicBool::new(false)));
            self.launched
                .lock()
                .push((job.name.clone(), port, switch.clone()));
            Ok(switch)
        }

        fn try_finish(&self, handle: &mut Switch) -> Option<JobOutcome> {
            handle
                .0
                .load(Ordering::Acquire)
                .then_some(JobOutcome::Finished)
        }
    }

    fn job(name: &str) -> Job {
        let config: SimulationConfig = serde_json::from_value(serde_json::json!({
            "name": name,
            "n_clients": 1,
            "retrieve_distribution": [1.0],
            "commit_latency": [0],
            "max_rounds": 1
        }))
        .unwrap();
        Job::from(config)
    }

    #[test]
    fn test_fifo_single_runner() {
        let jobs = JobScheduler::new(MockLauncher::default());

        jobs.submit(job("a"));
        jobs.submit(job("b"));

        assert_eq!(jobs.status("a"), JobStatus::Running);
        assert_eq!(jobs.status("b"), JobStatus::Queued);

        jobs.launcher.switch("a").flip();
        jobs.forward();

        assert_eq!(jobs.status("a"), JobStatus::Finished);
        assert_eq!(jobs.status("b"), JobStatus::Running);
        assert_eq!(jobs.status("c"), JobStatus::NotFound);
    }

    #[test]
    fn test_status_forwards_by_itself() {
        let jobs = JobScheduler::new(MockLauncher::default());

        jobs.submit(job("a"));
        jobs.launcher.switch("a").flip();

        assert_eq!(jobs.status("a"), JobStatus::Finished);
    }

    #[test]
    fn test_ports_wrap_around() {
        let jobs = JobScheduler::with_ports(MockLauncher::default(), 9000..=9001);

        for name in ["a", "b", "c"] {
            jobs.submit(job(name));
            jobs.launcher.switch(name).flip();
            jobs.forward();
        }

        assert_eq!(jobs.launcher.ports(), [9000, 9001, 9000]);
    }

    #[test]
    fn test_failed_launch_moves_on() {
        let jobs = JobScheduler::new(MockLauncher::default());

        jobs.submit(job("bad-config"));
        jobs.submit(job("good"));

        assert_eq!(jobs.status("bad-config"), JobStatus::Failed);
        assert_eq!(jobs.status("good"), JobStatus::Running);
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&JobStatus::NotFound).unwrap();
        assert_eq!(json, r#""not_found""#);
    }
}
