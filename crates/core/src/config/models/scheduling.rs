use serde::{Deserialize, Serialize};

use crate::errors::{DispatchError, DispatchResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulingConfig {
    /// Rolling window bucket width
    pub window_minutes: i64,
    /// Allocations admitted per window bucket
    pub max_per_window: usize,
    pub reservation_ttl_seconds: i64,
    pub sweep_interval_seconds: u64,
    pub schedule_interval_seconds: u64,
    /// Batch size drained per scheduling pass
    pub default_batch_capacity: usize,
    /// Length of the booked berth window for one vessel
    pub berth_occupancy_minutes: i64,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            window_minutes: 60,
            max_per_window: 10,
            reservation_ttl_seconds: 1800,
            sweep_interval_seconds: 30,
            schedule_interval_seconds: 10,
            default_batch_capacity: 8,
            berth_occupancy_minutes: 240,
        }
    }
}

impl SchedulingConfig {
    pub fn validate(&self) -> DispatchResult<()> {
        if self.window_minutes <= 0 {
            return Err(DispatchError::InvalidConfiguration(
                "调度窗口长度必须大于0".to_string(),
            ));
        }
        if self.max_per_window == 0 {
            return Err(DispatchError::InvalidConfiguration(
                "每个窗口的最大调度数必须大于0".to_string(),
            ));
        }
        if self.reservation_ttl_seconds <= 0 {
            return Err(DispatchError::InvalidConfiguration(
                "泊位预留有效期必须大于0".to_string(),
            ));
        }
        if self.sweep_interval_seconds == 0 || self.schedule_interval_seconds == 0 {
            return Err(DispatchError::InvalidConfiguration(
                "调度与清理间隔必须大于0".to_string(),
            ));
        }
        if self.berth_occupancy_minutes <= 0 {
            return Err(DispatchError::InvalidConfiguration(
                "泊位占用时长必须大于0".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    /// Sequence distance between global checkpoints
    pub interval: u64,
    /// Window size for windowed replay
    pub replay_window_size: usize,
    /// Journal entries kept per stream behind its checkpoint
    pub journal_retention: u64,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            interval: 100,
            replay_window_size: 500,
            journal_retention: 1000,
        }
    }
}

impl CheckpointConfig {
    pub fn validate(&self) -> DispatchResult<()> {
        if self.interval == 0 {
            return Err(DispatchError::InvalidConfiguration(
                "检查点间隔必须大于0".to_string(),
            ));
        }
        if self.replay_window_size == 0 {
            return Err(DispatchError::InvalidConfiguration(
                "回放窗口大小必须大于0".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub base_cost_per_unit: f64,
    pub latency_weight: f64,
    /// Priority used when ranking channels outside of a request context
    pub default_priority: f64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            base_cost_per_unit: 100.0,
            latency_weight: 2.5,
            default_priority: 1.0,
        }
    }
}

impl RoutingConfig {
    pub fn validate(&self) -> DispatchResult<()> {
        if !(self.latency_weight >= 0.0) || !self.latency_weight.is_finite() {
            return Err(DispatchError::InvalidConfiguration(format!(
                "延迟权重不能为负: {}",
                self.latency_weight
            )));
        }
        if !self.base_cost_per_unit.is_finite() {
            return Err(DispatchError::InvalidConfiguration(
                "基础成本必须是有限数值".to_string(),
            ));
        }
        Ok(())
    }
}
