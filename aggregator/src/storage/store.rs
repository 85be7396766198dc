use std::{
    fmt::{self, Display},
    mem,
    sync::Arc,
};

use log::{debug, info};
use model::Metrics;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use super::{Backend, Result};

const CONFIG_FILE: &str = "config.json";
const METRICS_FILE: &str = "metrics.jsonl";

/// Identifies who produced a persisted model: a client or the aggregator itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Client(usize),
    Aggregated,
}

impl Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Client(idx) => write!(f, "{idx}"),
            Slot::Aggregated => f.write_str("agg"),
        }
    }
}

impl Slot {
    /// The artifact name of the model produced by this slot at `round`.
    pub fn artifact_name(&self, round: usize) -> String {
        format!("{round}_{self}.safetensors")
    }
}

/// A trained model committed by a client, waiting to be aggregated.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelUpdate {
    pub client: usize,
    pub round: usize,
    pub payload: Vec<u8>,
}

impl ModelUpdate {
    pub fn new(client: usize, round: usize, payload: Vec<u8>) -> Self {
        Self {
            client,
            round,
            payload,
        }
    }
}

/// An immutable published aggregate, shared by every client that retrieves it.
#[derive(Debug, PartialEq)]
pub struct GlobalSnapshot {
    round: usize,
    payload: Vec<u8>,
}

impl GlobalSnapshot {
    /// The aggregation round this snapshot was published at.
    pub fn round(&self) -> usize {
        self.round
    }

    /// The serialized tensors of the snapshot.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

#[derive(Debug, Default)]
struct Published {
    round: usize,
    current: Option<Arc<GlobalSnapshot>>,
}

#[derive(Serialize)]
struct MetricsRecord<'a> {
    round: usize,
    metrics: &'a Metrics,
}

/// Persists every model of a run and buffers the updates of the round in progress.
///
/// Committers only ever contend on the pending buffer lock, while readers of the
/// current snapshot only clone an `Arc` under a read lock.
#[derive(Debug)]
pub struct UpdateStore<B: Backend> {
    backend: B,
    pending: Mutex<Vec<ModelUpdate>>,
    published: RwLock<Published>,
}

impl<B: Backend> UpdateStore<B> {
    /// Creates a new `UpdateStore`.
    ///
    /// # Arguments
    /// * `backend` - Where the artifacts get written.
    /// * `clear_existing` - Whether to wipe the artifacts of a previous run first.
    ///
    /// # Returns
    /// A new `UpdateStore` or an io error if the backend could not be cleared.
    pub fn new(backend: B, clear_existing: bool) -> Result<Self> {
        if clear_existing {
            debug!("clearing previous artifacts");
            backend.clear()?;
        }

        Ok(Self {
            backend,
            pending: Mutex::new(Vec::new()),
            published: RwLock::new(Published::default()),
        })
    }

    /// The underlying artifact backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Durably writes `payload` under the name derived from `round` and `slot`.
    pub fn put(&self, round: usize, slot: Slot, payload: &[u8]) -> Result<()> {
        let name = slot.artifact_name(round);
        debug!(name = name.as_str(), size = payload.len(); "writing model");
        self.backend.write(&name, payload)?;
        Ok(())
    }

    /// Persists a client update and appends it to the pending buffer.
    ///
    /// The artifact is named after the round it will be aggregated into, not the
    /// round it was trained from.
    ///
    /// # Arguments
    /// * `update` - The trained model a client just committed.
    pub fn push(&self, update: ModelUpdate) -> Result<()> {
        let round = self.round();
        self.put(round, Slot::Client(update.client), &update.payload)?;
        self.pending.lock().push(update);
        Ok(())
    }

    /// Atomically takes every pending update, leaving the buffer empty.
    ///
    /// Updates pushed after this call belong to the next aggregation.
    pub fn drain_pending(&self) -> Vec<ModelUpdate> {
        mem::take(&mut *self.pending.lock())
    }

    /// Puts back updates taken by `drain_pending`, ahead of anything pushed since.
    pub fn restore_pending(&self, mut updates: Vec<ModelUpdate>) {
        let mut pending = self.pending.lock();
        updates.append(&mut pending);
        *pending = updates;
    }

    /// The amount of updates waiting to be aggregated.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Persists a new aggregate and makes it the current snapshot.
    ///
    /// # Arguments
    /// * `payload` - The serialized aggregated tensors.
    ///
    /// # Returns
    /// The published snapshot, tagged with the round it was written at.
    pub fn publish_snapshot(&self, payload: Vec<u8>) -> Result<Arc<GlobalSnapshot>> {
        let mut published = self.published.write();
        let round = published.round;

        self.put(round, Slot::Aggregated, &payload)?;

        let snapshot = Arc::new(GlobalSnapshot { round, payload });
        published.current = Some(Arc::clone(&snapshot));
        published.round = round + 1;

        info!(round = round; "published global snapshot");
        Ok(snapshot)
    }

    /// The latest published snapshot, if any.
    pub fn current_snapshot(&self) -> Option<Arc<GlobalSnapshot>> {
        self.published.read().current.clone()
    }

    /// The round the next published snapshot will be tagged with.
    pub fn round(&self) -> usize {
        self.published.read().round
    }

    /// Stores the configuration the run was started with next to its models.
    pub fn persist_config(&self, config: &[u8]) -> Result<()> {
        self.backend.write(CONFIG_FILE, config)?;
        Ok(())
    }

    /// Appends the evaluation metrics of `round` as a json line.
    pub fn record_metrics(&self, round: usize, metrics: &Metrics) -> Result<()> {
        let mut line = serde_json::to_vec(&MetricsRecord { round, metrics })?;
        line.push(b'\n');
        self.backend.append(METRICS_FILE, &line)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;

    fn create_test_store() -> UpdateStore<MemoryBackend> {
        UpdateStore::new(MemoryBackend::new(), false).unwrap()
    }

    #[test]
    fn test_slot_artifact_names() {
        assert_eq!(Slot::Client(3).artifact_name(2), "2_3.safetensors");
        assert_eq!(Slot::Aggregated.artifact_name(0), "0_agg.safetensors");
    }

    #[test]
    fn test_push_persists_and_buffers() {
        let store = create_test_store();

        store.push(ModelUpdate::new(1, 0, vec![1, 2])).unwrap();
        store.push(ModelUpdate::new(0, 0, vec![3])).unwrap();

        assert_eq!(store.pending_len(), 2);
        assert_eq!(
            store.backend().read("0_1.safetensors").unwrap().unwrap(),
            vec![1, 2]
        );

        let drained = store.drain_pending();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].client, 1);
        assert_eq!(store.pending_len(), 0);
    }

    #[test]
    fn test_restore_keeps_order_before_new_pushes() {
        let store = create_test_store();

        store.push(ModelUpdate::new(0, 0, vec![0])).unwrap();
        let drained = store.drain_pending();
        store.push(ModelUpdate::new(1, 1, vec![1])).unwrap();
        store.restore_pending(drained);

        let clients: Vec<_> = store.drain_pending().iter().map(|u| u.client).collect();
        assert_eq!(clients, [0, 1]);
    }

    #[test]
    fn test_publish_advances_round() {
        let store = create_test_store();
        assert!(store.current_snapshot().is_none());

        let first = store.publish_snapshot(vec![7]).unwrap();
        let second = store.publish_snapshot(vec![8]).unwrap();

        assert_eq!(first.round(), 0);
        assert_eq!(second.round(), 1);
        assert_eq!(store.round(), 2);
        assert_eq!(store.current_snapshot().unwrap().payload(), &[8]);
        assert_eq!(
            store.backend().names(),
            ["0_agg.safetensors", "1_agg.safetensors"]
        );
    }

    #[test]
    fn test_record_metrics_appends_lines() {
        let store = create_test_store();
        let metrics = Metrics::from([("loss".to_string(), 0.5)]);

        store.record_metrics(0, &metrics).unwrap();
        store.record_metrics(1, &metrics).unwrap();

        let raw = store.backend().read(METRICS_FILE).unwrap().unwrap();
        let text = String::from_utf8(raw).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], r#"{"round":1,"metrics":{"loss":0.5}}"#);
    }

    #[test]
    fn test_clear_existing_wipes_backend() {
        let backend = MemoryBackend::new();
        backend.write("stale", b"old").unwrap();

        let store = UpdateStore::new(backend, true).unwrap();
        assert!(store.backend().names().is_empty());
    }
}
