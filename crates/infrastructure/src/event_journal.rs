use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use harbor_core::{Clock, ReplayedEvent};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

/// Stream carrying committed berth allocations
pub const ALLOCATION_STREAM: &str = "allocations";
/// Stream carrying committed route selections
pub const ROUTE_STREAM: &str = "routes";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub stream_id: String,
    pub event: ReplayedEvent,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct JournalState {
    sequences: HashMap<String, u64>,
    entries: Vec<JournalEntry>,
    // every append ever made, unaffected by compaction
    appended: u64,
}

/// 事件日志
///
/// 为每个流分配单调递增的序号（从1开始），记录已提交的调度决策，供回放使用。
/// 检查点之后的旧条目可通过 `compact` 丢弃，序号不受影响。
#[derive(Debug)]
pub struct EventJournal {
    clock: Arc<dyn Clock>,
    state: RwLock<JournalState>,
}

impl EventJournal {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: RwLock::new(JournalState::default()),
        }
    }

    pub async fn append(
        &self,
        stream_id: &str,
        event_id: impl Into<String>,
        payload: serde_json::Value,
    ) -> ReplayedEvent {
        let mut state = self.state.write().await;
        let sequence = {
            let counter = state.sequences.entry(stream_id.to_string()).or_insert(0);
            *counter += 1;
            *counter
        };
        let event = ReplayedEvent::new(event_id, sequence, payload);
        state.appended += 1;
        state.entries.push(JournalEntry {
            stream_id: stream_id.to_string(),
            event: event.clone(),
            recorded_at: self.clock.now(),
        });
        debug!(
            stream_id = stream_id,
            event_id = %event.id,
            sequence = sequence,
            "事件已写入日志"
        );
        event
    }

    /// Last assigned sequence of a stream, 0 when nothing was appended
    pub async fn last_sequence(&self, stream_id: &str) -> u64 {
        self.state
            .read()
            .await
            .sequences
            .get(stream_id)
            .copied()
            .unwrap_or(0)
    }

    /// Events appended over the journal's lifetime, including compacted ones
    pub async fn total_events(&self) -> u64 {
        self.state.read().await.appended
    }

    pub async fn retained_events(&self) -> usize {
        self.state.read().await.entries.len()
    }

    /// Drop a stream's entries with sequence `<= up_to`. Returns how many were removed.
    pub async fn compact(&self, stream_id: &str, up_to: u64) -> usize {
        let mut state = self.state.write().await;
        let before = state.entries.len();
        state
            .entries
            .retain(|entry| entry.stream_id != stream_id || entry.event.sequence > up_to);
        let removed = before - state.entries.len();
        if removed > 0 {
            debug!(stream_id = stream_id, up_to = up_to, removed = removed, "日志已压缩");
        }
        removed
    }

    pub async fn events(&self, stream_id: &str) -> Vec<ReplayedEvent> {
        self.state
            .read()
            .await
            .entries
            .iter()
            .filter(|entry| entry.stream_id == stream_id)
            .map(|entry| entry.event.clone())
            .collect()
    }

    pub async fn entries(&self) -> Vec<JournalEntry> {
        self.state.read().await.entries.clone()
    }
}
