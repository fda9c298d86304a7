use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 货物/船舶物理属性
///
/// 泊位可行性检查使用 `draft`（吃水，米）和 `length`（船长，米）；
/// `tonnage` 仅作记录和统计用途。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CargoProfile {
    pub draft: f64,
    pub length: f64,
    pub tonnage: f64,
}

/// 调度请求
///
/// 在接入时创建，准入后不可变。分配到泊位或被拒绝即为终态。
///
/// # 字段说明
///
/// - `id`: 请求唯一标识，同时作为船舶引用
/// - `caller_id`: 提交方标识，用作限流键
/// - `urgency`: 紧急度评分，越大越紧急
/// - `eta`: 预计到港时间，作为同紧急度时的排序键
/// - `cargo`: 吃水、船长、吨位
/// - `submitted_at`: 提交时间
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchRequest {
    pub id: String,
    pub caller_id: String,
    pub urgency: f64,
    pub eta: DateTime<Utc>,
    pub cargo: CargoProfile,
    pub submitted_at: DateTime<Utc>,
}

impl DispatchRequest {
    pub fn vessel_id(&self) -> &str {
        &self.id
    }
}

/// Queue slot: the held item, its priority key and the insertion sequence
/// that breaks ties between equal priorities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry<T> {
    pub item: T,
    pub priority: f64,
    pub sequence: u64,
}

impl<T> QueueEntry<T> {
    pub fn new(item: T, priority: f64, sequence: u64) -> Self {
        Self {
            item,
            priority,
            sequence,
        }
    }
}
