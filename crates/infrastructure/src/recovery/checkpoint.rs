use std::collections::BTreeMap;

use harbor_core::{CheckpointRecord, DispatchError, DispatchResult};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Outcome of recording a stream sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// The stored sequence moved forward (or the stream was new)
    Advanced { previous: Option<u64> },
    /// The same sequence was already stored
    Unchanged,
    /// A lower sequence than the stored one; nothing was written
    Stale { stored: u64 },
}

#[derive(Debug, Default)]
struct CheckpointState {
    streams: BTreeMap<String, u64>,
    last_global: u64,
}

/// 检查点管理器
///
/// 每个流保存最后提交的序号，只增不减：较低序号的写入是空操作，
/// 以序号而非到达顺序为准。所有状态在一把锁内。
#[derive(Debug)]
pub struct CheckpointManager {
    interval: u64,
    state: RwLock<CheckpointState>,
}

impl CheckpointManager {
    pub fn new(interval: u64) -> DispatchResult<Self> {
        if interval == 0 {
            return Err(DispatchError::InvalidConfiguration(
                "检查点间隔必须大于0".to_string(),
            ));
        }
        Ok(Self {
            interval,
            state: RwLock::new(CheckpointState::default()),
        })
    }

    pub fn interval(&self) -> u64 {
        self.interval
    }

    pub async fn record(&self, stream_id: &str, sequence: u64) -> RecordOutcome {
        let mut state = self.state.write().await;
        match state.streams.get(stream_id).copied() {
            Some(stored) if sequence < stored => {
                warn!(
                    stream_id = stream_id,
                    stored = stored,
                    attempted = sequence,
                    "忽略过期的检查点写入"
                );
                RecordOutcome::Stale { stored }
            }
            Some(stored) if sequence == stored => RecordOutcome::Unchanged,
            previous => {
                state.streams.insert(stream_id.to_string(), sequence);
                debug!(stream_id = stream_id, sequence = sequence, "检查点已推进");
                RecordOutcome::Advanced { previous }
            }
        }
    }

    pub async fn get(&self, stream_id: &str) -> Option<u64> {
        self.state.read().await.streams.get(stream_id).copied()
    }

    /// Whether `current` is at least one interval past the last global checkpoint
    pub async fn should_checkpoint(&self, current: u64) -> bool {
        let last_global = self.state.read().await.last_global;
        current.saturating_sub(last_global) >= self.interval
    }

    pub async fn mark_checkpointed(&self, global_sequence: u64) {
        let mut state = self.state.write().await;
        state.last_global = state.last_global.max(global_sequence);
    }

    pub async fn last_global(&self) -> u64 {
        self.state.read().await.last_global
    }

    /// Merge another manager's progress: per stream the maximum wins and streams
    /// only present in `other` are adopted. Commutative and idempotent.
    pub async fn merge(&self, other: &CheckpointManager) {
        let (other_streams, other_global) = {
            let other_state = other.state.read().await;
            (other_state.streams.clone(), other_state.last_global)
        };
        let mut state = self.state.write().await;
        merge_records(&mut state.streams, &other_streams);
        state.last_global = state.last_global.max(other_global);
    }

    pub async fn snapshot(&self) -> CheckpointRecord {
        self.state.read().await.streams.clone()
    }

    /// Restore a persisted record. Restoring never moves a stream backwards.
    pub async fn restore(&self, record: &CheckpointRecord) {
        let mut state = self.state.write().await;
        merge_records(&mut state.streams, record);
    }
}

fn merge_records(target: &mut BTreeMap<String, u64>, source: &BTreeMap<String, u64>) {
    for (stream_id, &sequence) in source {
        target
            .entry(stream_id.clone())
            .and_modify(|stored| *stored = (*stored).max(sequence))
            .or_insert(sequence);
    }
}
