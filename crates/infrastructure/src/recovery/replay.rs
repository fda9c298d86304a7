//! 事件回放
//!
//! 同一 id 的事件以最高序号为准；序号相同时以载荷的规范化 JSON 文本较大者为准，
//! 因此任意输入顺序得到的回放结果逐字节一致。

use std::collections::{BTreeMap, HashSet};
use std::hash::Hash;

use harbor_core::{DispatchError, DispatchResult, ReplayedEvent};
use tracing::{debug, error};

/// Replay a set of events into its deterministic final form: one event per id,
/// ordered by sequence then id.
pub fn replay(events: &[ReplayedEvent]) -> Vec<ReplayedEvent> {
    let mut latest: BTreeMap<&str, (&ReplayedEvent, String)> = BTreeMap::new();

    for event in events {
        let canonical = event.payload.to_string();
        let replaces = match latest.get(event.id.as_str()) {
            Some((current, current_canonical)) => {
                (event.sequence, canonical.as_str())
                    > (current.sequence, current_canonical.as_str())
            }
            None => true,
        };
        if replaces {
            latest.insert(event.id.as_str(), (event, canonical));
        }
    }

    let mut result: Vec<ReplayedEvent> = latest
        .into_values()
        .map(|(event, _)| event.clone())
        .collect();
    result.sort_by(|a, b| a.sequence.cmp(&b.sequence).then_with(|| a.id.cmp(&b.id)));
    result
}

pub fn replay_converges(left: &[ReplayedEvent], right: &[ReplayedEvent]) -> bool {
    replay(left) == replay(right)
}

/// Replay both inputs and return the common result, or a fatal divergence
/// naming the first mismatching position.
pub fn verify_convergence(
    left: &[ReplayedEvent],
    right: &[ReplayedEvent],
) -> DispatchResult<Vec<ReplayedEvent>> {
    let left_replayed = replay(left);
    let right_replayed = replay(right);

    if left_replayed == right_replayed {
        return Ok(left_replayed);
    }

    let first_mismatch = left_replayed
        .iter()
        .zip(right_replayed.iter())
        .position(|(l, r)| l != r)
        .or(Some(left_replayed.len().min(right_replayed.len())));

    error!(
        left_len = left_replayed.len(),
        right_len = right_replayed.len(),
        first_mismatch = ?first_mismatch,
        "回放结果不一致"
    );

    Err(DispatchError::ReplayDivergence {
        left_len: left_replayed.len(),
        right_len: right_replayed.len(),
        first_mismatch,
    })
}

/// Keep the first occurrence per key, in original order
pub fn deduplicate<T, K, F>(items: &[T], key_fn: F) -> Vec<T>
where
    T: Clone,
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut seen = HashSet::new();
    items
        .iter()
        .filter(|item| seen.insert(key_fn(item)))
        .cloned()
        .collect()
}

/// Replay fixed-size windows independently and concatenate the results.
/// Ids repeated across windows are not collapsed.
pub fn replay_with_windowing(
    events: &[ReplayedEvent],
    window: usize,
) -> DispatchResult<Vec<ReplayedEvent>> {
    if window == 0 {
        return Err(DispatchError::InvalidConfiguration(
            "回放窗口大小必须大于0".to_string(),
        ));
    }

    Ok(events.chunks(window).flat_map(replay).collect())
}

/// Replay front end holding the configured window size
#[derive(Debug, Clone)]
pub struct ReplayEngine {
    window_size: usize,
}

impl ReplayEngine {
    pub fn new(window_size: usize) -> DispatchResult<Self> {
        if window_size == 0 {
            return Err(DispatchError::InvalidConfiguration(
                "回放窗口大小必须大于0".to_string(),
            ));
        }
        Ok(Self { window_size })
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn replay(&self, events: &[ReplayedEvent]) -> Vec<ReplayedEvent> {
        let result = replay(events);
        debug!(input = events.len(), output = result.len(), "事件回放完成");
        result
    }

    pub fn replay_windowed(&self, events: &[ReplayedEvent]) -> DispatchResult<Vec<ReplayedEvent>> {
        replay_with_windowing(events, self.window_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(id: &str, sequence: u64, payload: serde_json::Value) -> ReplayedEvent {
        ReplayedEvent::new(id, sequence, payload)
    }

    #[test]
    fn test_replay_keeps_highest_sequence() {
        let events = vec![
            event("a", 1, json!({"berth": "B1"})),
            event("b", 2, json!({"berth": "B2"})),
            event("a", 3, json!({"berth": "B3"})),
        ];

        let result = replay(&events);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].id, "b");
        assert_eq!(result[1].id, "a");
        assert_eq!(result[1].payload, json!({"berth": "B3"}));
    }

    #[test]
    fn test_replay_sequence_tie_is_order_independent() {
        let x = event("a", 5, json!({"v": 1}));
        let y = event("a", 5, json!({"v": 2}));

        let forward = replay(&[x.clone(), y.clone()]);
        let backward = replay(&[y, x]);
        assert_eq!(forward, backward);
        assert_eq!(forward[0].payload, json!({"v": 2}));
    }

    #[test]
    fn test_replay_orders_equal_sequences_by_id() {
        let events = vec![event("zeta", 1, json!(null)), event("alpha", 1, json!(null))];
        let ids: Vec<_> = replay(&events).into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_verify_convergence_reports_divergence() {
        let left = vec![event("a", 1, json!(1)), event("b", 2, json!(2))];
        let right = vec![event("a", 1, json!(1)), event("b", 2, json!(3))];

        assert!(verify_convergence(&left, &left).is_ok());
        match verify_convergence(&left, &right) {
            Err(DispatchError::ReplayDivergence {
                left_len,
                right_len,
                first_mismatch,
            }) => {
                assert_eq!((left_len, right_len), (2, 2));
                assert_eq!(first_mismatch, Some(1));
            }
            other => panic!("expected divergence, got {other:?}"),
        }
    }

    #[test]
    fn test_deduplicate_keeps_first_in_order() {
        let events = vec![
            event("a", 3, json!(1)),
            event("b", 1, json!(2)),
            event("a", 1, json!(3)),
        ];
        let result = deduplicate(&events, |e| e.id.clone());
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].sequence, 3);
        assert_eq!(result[1].id, "b");
    }

    #[test]
    fn test_windowing_replays_windows_independently() {
        let events = vec![
            event("a", 1, json!(1)),
            event("a", 2, json!(2)),
            event("a", 3, json!(3)),
        ];
        let result = replay_with_windowing(&events, 2).unwrap();
        let sequences: Vec<_> = result.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![2, 3]);

        assert!(replay_with_windowing(&events, 0).is_err());
    }
}
