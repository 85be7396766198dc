mod http;

use model::Metrics;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use http::HttpRegistry;

use crate::error::Result;

/// The tokens a client presents on every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub group: String,
    pub client: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Train,
    Evaluate,
    #[serde(other)]
    Unknown,
}

/// A unit of work handed out by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskAssignment {
    #[serde(rename = "type")]
    pub kind: TaskKind,
    pub host: String,
    pub port: u16,
    pub token: String,
}

impl TaskAssignment {
    /// Where the task payload is fetched from and its result reported to.
    pub fn url(&self) -> String {
        format!("http://{}:{}/task/{}", self.host, self.port, self.token)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSubscription {
    #[serde(rename = "type")]
    pub kind: TaskKind,
    pub protocols: Vec<String>,
}

/// The tasks a client is willing to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub tasks: Vec<TaskSubscription>,
}

impl Default for Subscription {
    fn default() -> Self {
        let task = |kind| TaskSubscription {
            kind,
            protocols: vec!["http".into()],
        };

        Self {
            tasks: vec![task(TaskKind::Train), task(TaskKind::Evaluate)],
        }
    }
}

/// The remote side handing out work to clients.
#[allow(unused)]
#[trait_variant::make(Registry: Send)]
pub trait LocalRegistry {
    /// Joins `group`, returning the client token to use from now on.
    async fn register(&self, group: &str, params: Option<&Value>) -> Result<String>;

    async fn subscribe(&self, creds: &Credentials, subscription: &Subscription) -> Result<()>;

    /// Asks for the next task. Fails with a transient error while there's none.
    async fn poll_task(&self, creds: &Credentials) -> Result<TaskAssignment>;

    async fn fetch_payload(&self, creds: &Credentials, task: &TaskAssignment) -> Result<Vec<u8>>;

    async fn report_update(
        &self,
        creds: &Credentials,
        task: &TaskAssignment,
        update: Vec<u8>,
    ) -> Result<()>;

    async fn report_metrics(
        &self,
        creds: &Credentials,
        task: &TaskAssignment,
        metrics: &Metrics,
    ) -> Result<()>;

    async fn unsubscribe(&self, creds: &Credentials) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_assignment_wire_format() {
        let task: TaskAssignment = serde_json::from_str(
            r#"{"type":"train","host":"10.0.0.2","port":9000,"token":"t1"}"#,
        )
        .unwrap();

        assert_eq!(task.kind, TaskKind::Train);
        assert_eq!(task.url(), "http://10.0.0.2:9000/task/t1");
    }

    #[test]
    fn test_unknown_task_kind() {
        let task: TaskAssignment =
            serde_json::from_str(r#"{"type":"predict","host":"h","port":1,"token":"t"}"#)
                .unwrap();

        assert_eq!(task.kind, TaskKind::Unknown);
    }

    #[test]
    fn test_default_subscription() {
        let json = serde_json::to_value(Subscription::default()).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "tasks": [
                    { "type": "train", "protocols": ["http"] },
                    { "type": "evaluate", "protocols": ["http"] }
                ]
            })
        );
    }
}
