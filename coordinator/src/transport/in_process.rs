use std::sync::Arc;

use aggregator::GlobalSnapshot;
use model::{Model, ModelErr};
use serde_json::Value;
use tokio::task::{self, JoinHandle};

use super::ClientLink;
use crate::error::LinkErr;

/// A client simulated inside the coordinator, training on the blocking pool.
pub struct InProcessLink {
    model: Arc<dyn Model>,
    training: Option<JoinHandle<Result<Vec<u8>, ModelErr>>>,
}

impl InProcessLink {
    /// Creates a new `InProcessLink`.
    ///
    /// # Arguments
    /// * `model` - The training capability, possibly shared with other clients.
    pub fn new(model: Arc<dyn Model>) -> Self {
        Self {
            model,
            training: None,
        }
    }
}

impl ClientLink for InProcessLink {
    async fn retrieve(&mut self, snapshot: Arc<GlobalSnapshot>, params: &Value) -> Result<(), LinkErr> {
        let model = Arc::clone(&self.model);
        let params = params.clone();

        let handle = task::spawn_blocking(move || model.train(snapshot.payload(), &params));

        if let Some(previous) = self.training.replace(handle) {
            previous.abort();
        }

        Ok(())
    }

    async fn commit(&mut self) -> Result<Vec<u8>, LinkErr> {
        let handle = self.training.take().ok_or(LinkErr::NothingToCommit)?;

        match handle.await {
            Ok(result) => Ok(result?),
            Err(e) => Err(LinkErr::Model(ModelErr::Backend(format!(
                "training task failed: {e}"
            )))),
        }
    }

    async fn close(mut self) {
        if let Some(handle) = self.training.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use model::{Metrics, NoopModel};

    use super::*;

    struct FailingModel;

    impl Model for FailingModel {
        fn train(&self, _weights: &[u8], _params: &Value) -> Result<Vec<u8>, ModelErr> {
            Err(ModelErr::Backend("diverged".into()))
        }

        fn evaluate(&self, _weights: &[u8], _params: &Value) -> Result<Metrics, ModelErr> {
            Ok(Metrics::new())
        }
    }

    fn snapshot(store_payload: &[u8]) -> Arc<GlobalSnapshot> {
        let store = aggregator::UpdateStore::new(aggregator::MemoryBackend::new(), false).unwrap();
        store.publish_snapshot(store_payload.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_retrieve_then_commit() {
        let mut link = InProcessLink::new(Arc::new(NoopModel));

        link.retrieve(snapshot(b"weights"), &Value::Null).await.unwrap();
        assert_eq!(link.commit().await.unwrap(), b"weights");
    }

    #[tokio::test]
    async fn test_commit_without_retrieve() {
        let mut link = InProcessLink::new(Arc::new(NoopModel));

        let err = link.commit().await.unwrap_err();
        assert!(matches!(err, LinkErr::NothingToCommit));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_training_error_is_not_fatal() {
        let mut link = InProcessLink::new(Arc::new(FailingModel));

        link.retrieve(snapshot(b"w"), &Value::Null).await.unwrap();
        let err = link.commit().await.unwrap_err();
        assert!(matches!(err, LinkErr::Model(_)));
        assert!(!err.is_fatal());
    }
}
