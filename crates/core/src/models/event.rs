use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// 可回放事件
///
/// 同一 id 的多条事件中序号最大者为准。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayedEvent {
    pub id: String,
    pub sequence: u64,
    pub payload: serde_json::Value,
}

impl ReplayedEvent {
    pub fn new(id: impl Into<String>, sequence: u64, payload: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            sequence,
            payload,
        }
    }
}

/// Persisted checkpoint shape: stream id -> last committed sequence
pub type CheckpointRecord = BTreeMap<String, u64>;
