use std::sync::Arc;

use log::{debug, warn};
use model::{TensorMap, decode, encode};

use super::{AggStrategy, AggregationErr, Result, aggregate, check_schema};
use crate::storage::{Backend, GlobalSnapshot, ModelUpdate, UpdateStore};

/// Turns the pending updates of an `UpdateStore` into a new global snapshot.
#[derive(Debug)]
pub struct AggregationEngine<S: AggStrategy, B: Backend> {
    strategy: S,
    store: Arc<UpdateStore<B>>,
}

impl<S: AggStrategy, B: Backend> AggregationEngine<S, B> {
    /// Creates a new `AggregationEngine`.
    ///
    /// # Arguments
    /// * `strategy` - How the updates of a batch are combined.
    /// * `store` - The store holding the pending updates and receiving the aggregates.
    pub fn new(strategy: S, store: Arc<UpdateStore<B>>) -> Self {
        Self { strategy, store }
    }

    pub fn store(&self) -> &Arc<UpdateStore<B>> {
        &self.store
    }

    /// Drains the pending updates, folds them and publishes the result.
    ///
    /// On failure the drained updates are put back so the next attempt sees them
    /// again, together with whatever got committed in between.
    ///
    /// # Returns
    /// The freshly published snapshot or the reason the batch could not be aggregated.
    pub fn aggregate(&self) -> Result<Arc<GlobalSnapshot>> {
        let updates = self.store.drain_pending();
        if updates.is_empty() {
            return Err(AggregationErr::EmptyBatch);
        }

        debug!(updates = updates.len(); "aggregating batch");

        let published = self
            .fold(&updates)
            .and_then(|payload| Ok(self.store.publish_snapshot(payload)?));

        if let Err(e) = &published {
            warn!("aggregation failed, keeping {} updates: {e}", updates.len());
            self.store.restore_pending(updates);
        }

        published
    }

    fn fold(&self, updates: &[ModelUpdate]) -> Result<Vec<u8>> {
        let models = updates
            .iter()
            .map(|update| {
                decode(&update.payload).map_err(|source| AggregationErr::Payload {
                    client: Some(update.client),
                    source,
                })
            })
            .collect::<Result<Vec<TensorMap>>>()?;

        if let Some(current) = self.store.current_snapshot() {
            let reference = decode(current.payload())
                .map_err(|source| AggregationErr::Payload { client: None, source })?;

            // An empty seed carries no schema, the batch only has to agree with itself.
            if !reference.is_empty() {
                for model in &models {
                    check_schema(&reference, model)?;
                }
            }
        }

        let merged = aggregate(&self.strategy, &models)?;
        encode(&merged).map_err(|source| AggregationErr::Payload { client: None, source })
    }
}

#[cfg(test)]
mod tests {
    use model::Tensor;

    use super::*;
    use crate::{
        aggregation::FedAvg,
        storage::{MemoryBackend, Slot},
    };

    type TestEngine = AggregationEngine<FedAvg, MemoryBackend>;

    fn payload(w: &[f32]) -> Vec<u8> {
        let tensors = TensorMap::from([("w".to_string(), Tensor::vector(w.to_vec()))]);
        encode(&tensors).unwrap()
    }

    fn create_test_engine() -> TestEngine {
        let store = UpdateStore::new(MemoryBackend::new(), false).unwrap();
        AggregationEngine::new(FedAvg, Arc::new(store))
    }

    #[test]
    fn test_aggregate_publishes_mean() {
        let engine = create_test_engine();
        let store = engine.store();
        store.publish_snapshot(payload(&[0.0, 0.0])).unwrap();

        store.push(ModelUpdate::new(0, 1, payload(&[1.0, 2.0]))).unwrap();
        store.push(ModelUpdate::new(1, 1, payload(&[3.0, 4.0]))).unwrap();

        let snapshot = engine.aggregate().unwrap();
        assert_eq!(snapshot.round(), 1);

        let merged = decode(snapshot.payload()).unwrap();
        assert_eq!(merged["w"].data, [2.0, 3.0]);
        assert_eq!(store.pending_len(), 0);
        assert!(
            store
                .backend()
                .read(&Slot::Aggregated.artifact_name(1))
                .unwrap()
                .is_some()
        );
    }

    #[test]
    fn test_second_aggregate_on_drained_store_is_empty() {
        let engine = create_test_engine();
        engine
            .store()
            .push(ModelUpdate::new(0, 0, payload(&[1.0])))
            .unwrap();

        engine.aggregate().unwrap();
        let err = engine.aggregate().unwrap_err();
        assert!(matches!(err, AggregationErr::EmptyBatch));
    }

    #[test]
    fn test_failed_aggregation_keeps_updates() {
        let engine = create_test_engine();
        let store = engine.store();

        store.push(ModelUpdate::new(0, 0, payload(&[1.0]))).unwrap();
        store.push(ModelUpdate::new(1, 0, payload(&[1.0, 2.0]))).unwrap();

        let err = engine.aggregate().unwrap_err();
        assert!(matches!(err, AggregationErr::SchemaMismatch { .. }));
        assert_eq!(store.pending_len(), 2);
        assert_eq!(store.round(), 0);
        assert!(store.current_snapshot().is_none());
    }

    #[test]
    fn test_undecodable_update_names_client() {
        let engine = create_test_engine();
        engine
            .store()
            .push(ModelUpdate::new(4, 0, b"garbage".to_vec()))
            .unwrap();

        let err = engine.aggregate().unwrap_err();
        assert!(matches!(err, AggregationErr::Payload { client: Some(4), .. }));
    }

    #[test]
    fn test_update_must_match_current_snapshot() {
        let engine = create_test_engine();
        let store = engine.store();
        store.publish_snapshot(payload(&[0.0, 0.0])).unwrap();

        store.push(ModelUpdate::new(0, 1, payload(&[1.0]))).unwrap();

        let err = engine.aggregate().unwrap_err();
        assert!(matches!(err, AggregationErr::SchemaMismatch { .. }));
        assert_eq!(store.round(), 1);
    }

    #[test]
    fn test_empty_seed_accepts_first_schema() {
        let engine = create_test_engine();
        let store = engine.store();
        store.publish_snapshot(encode(&TensorMap::new()).unwrap()).unwrap();

        store.push(ModelUpdate::new(0, 0, payload(&[1.0]))).unwrap();
        store.push(ModelUpdate::new(1, 0, payload(&[3.0]))).unwrap();

        let snapshot = engine.aggregate().unwrap();
        let merged = decode(snapshot.payload()).unwrap();
        assert_eq!(merged["w"].data, [2.0]);

        store.push(ModelUpdate::new(0, 1, payload(&[1.0, 2.0]))).unwrap();
        let err = engine.aggregate().unwrap_err();
        assert!(matches!(err, AggregationErr::SchemaMismatch { .. }));
    }
}
