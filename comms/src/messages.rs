use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sent to a simulation client right after it introduced itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientHello {
    pub client_idx: usize,
    pub n_clients: usize,
}

/// Follows every snapshot frame so the client knows what it is training.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundInfo {
    pub round: usize,
    pub params: Value,
}
