use std::sync::Arc;

use aggregator::GlobalSnapshot;
use serde_json::Value;

use crate::error::LinkErr;

/// How the scheduler talks to one simulated client.
///
/// Every client of a run goes through the same kind of link, be it a remote
/// process behind a framed channel or a model living in this process.
#[allow(unused)]
#[trait_variant::make(ClientLink: Send)]
pub trait LocalClientLink {
    /// Hands the current snapshot to the client so it starts training on it.
    ///
    /// # Arguments
    /// * `snapshot` - The latest published global model.
    /// * `params` - The training parameters of the run.
    ///
    /// # Returns
    /// Once the client has the snapshot, training itself keeps going in the background.
    async fn retrieve(&mut self, snapshot: Arc<GlobalSnapshot>, params: &Value) -> Result<(), LinkErr>;

    /// Waits for the client to finish training and collects its update.
    ///
    /// # Returns
    /// The serialized trained model or the reason it could not be produced.
    async fn commit(&mut self) -> Result<Vec<u8>, LinkErr>;

    /// Releases the client, best effort.
    async fn close(self);
}
