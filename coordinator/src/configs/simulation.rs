use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConfigErr;

const DISTRIBUTION_EPSILON: f64 = 1e-9;

/// How the coordinator reaches its clients.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportConfig {
    /// Clients are simulated inside the coordinator process.
    #[default]
    InProcess,
    /// Clients connect over tcp to `host` on the port the run was launched with.
    Channel {
        #[serde(default = "default_host")]
        host: String,
    },
}

/// Everything needed to run one simulation, as submitted to the job queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub name: String,
    pub n_clients: usize,
    /// Fraction of the clients falling in each latency bucket.
    pub retrieve_distribution: Vec<f64>,
    /// Ticks between a retrieve and its commit, per bucket.
    pub commit_latency: Vec<u64>,
    pub max_rounds: usize,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub clear_existing: bool,
    /// A safetensors archive to start from, an empty model otherwise.
    #[serde(default)]
    pub initial_snapshot: Option<PathBuf>,
    #[serde(default)]
    pub train_params: Value,
    /// Evaluates every published snapshot with these parameters when present.
    #[serde(default)]
    pub eval_params: Option<Value>,
    #[serde(default = "default_max_aggregation_failures")]
    pub max_aggregation_failures: usize,
}

fn default_host() -> String {
    "0.0.0.0".into()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_max_aggregation_failures() -> usize {
    5
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Batch {
    Many(Vec<SimulationConfig>),
    One(Box<SimulationConfig>),
}

impl SimulationConfig {
    /// Parses either a single configuration or a list of them.
    ///
    /// # Arguments
    /// * `raw` - Json text holding an object or an array of objects.
    ///
    /// # Returns
    /// The configurations in submission order, each already validated.
    pub fn parse_batch(raw: &[u8]) -> Result<Vec<Self>, ConfigErr> {
        let configs = match serde_json::from_slice(raw)? {
            Batch::Many(configs) => configs,
            Batch::One(config) => vec![*config],
        };

        for config in &configs {
            config.validate()?;
        }

        Ok(configs)
    }

    /// The directory holding the artifacts of this run.
    pub fn artifact_dir(&self) -> PathBuf {
        self.output_dir.join(&self.name)
    }

    pub fn initial_snapshot(&self) -> Option<&Path> {
        self.initial_snapshot.as_deref()
    }

    /// Checks the configuration can be run before anything is started.
    pub fn validate(&self) -> Result<(), ConfigErr> {
        if self.name.trim().is_empty() {
            return Err(ConfigErr::Invalid("name must not be empty".into()));
        }

        if self.name.contains(['/', '\\']) || self.name == "." || self.name == ".." {
            return Err(ConfigErr::Invalid(format!(
                "name {:?} can't be used as a directory name",
                self.name
            )));
        }

        if self.n_clients == 0 {
            return Err(ConfigErr::Invalid("at least one client is required".into()));
        }

        if self.max_rounds == 0 {
            return Err(ConfigErr::Invalid("max_rounds must be greater than 0".into()));
        }

        if self.max_aggregation_failures == 0 {
            return Err(ConfigErr::Invalid(
                "max_aggregation_failures must be greater than 0".into(),
            ));
        }

        if self.retrieve_distribution.is_empty() {
            return Err(ConfigErr::Invalid(
                "retrieve_distribution needs at least one bucket".into(),
            ));
        }

        if self.commit_latency.len() != self.retrieve_distribution.len() {
            return Err(ConfigErr::Invalid(format!(
                "commit_latency has {} buckets but retrieve_distribution has {}",
                self.commit_latency.len(),
                self.retrieve_distribution.len()
            )));
        }

        for (i, fraction) in self.retrieve_distribution.iter().enumerate() {
            if !fraction.is_finite() || *fraction < 0.0 || *fraction > 1.0 {
                return Err(ConfigErr::Invalid(format!(
                    "bucket {i}: fraction {fraction} is not within [0, 1]"
                )));
            }
        }

        let total: f64 = self.retrieve_distribution.iter().sum();
        if total > 1.0 + DISTRIBUTION_EPSILON {
            return Err(ConfigErr::Invalid(format!(
                "retrieve_distribution adds up to {total}, more than 1"
            )));
        }

        Ok(())
    }
}
