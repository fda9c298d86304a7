use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::request::CargoProfile;

/// 泊位状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BerthState {
    Available,
    Reserved,
    Occupied,
    Maintenance,
}

/// 泊位
///
/// 在港口配置加载时创建。`assigned_vessel` 只记录船舶 id，泊位不拥有船舶。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BerthSlot {
    pub id: String,
    pub max_draft: f64,
    pub max_length: f64,
    pub state: BerthState,
    pub assigned_vessel: Option<String>,
    pub reserved_until: Option<DateTime<Utc>>,
}

impl BerthSlot {
    pub fn new(id: impl Into<String>, max_draft: f64, max_length: f64) -> Self {
        Self {
            id: id.into(),
            max_draft,
            max_length,
            state: BerthState::Available,
            assigned_vessel: None,
            reserved_until: None,
        }
    }

    /// Physical feasibility: tide adds headroom to the draft limit, length is fixed.
    pub fn can_accept(&self, cargo: &CargoProfile, tide_level: f64) -> bool {
        cargo.draft <= self.max_draft + tide_level && cargo.length <= self.max_length
    }

    /// A reservation is expired once `now` is strictly past `reserved_until`.
    pub fn reservation_expired(&self, now: DateTime<Utc>) -> bool {
        self.state == BerthState::Reserved
            && self.reserved_until.map(|until| now > until).unwrap_or(false)
    }

    pub fn is_available(&self, now: DateTime<Utc>) -> bool {
        self.state == BerthState::Available || self.reservation_expired(now)
    }
}

/// 半开时间区间 `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Half-open overlap: a window ending exactly where another starts does not overlap it.
    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }
}

/// 已提交的泊位+航道分配
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub allocation_id: String,
    pub request_id: String,
    pub vessel_id: String,
    pub berth_id: String,
    pub channel_id: String,
    pub route_cost: f64,
    pub window: TimeWindow,
    pub allocated_at: DateTime<Utc>,
}
