use serde::{Deserialize, Serialize};

/// 航道定义
///
/// `blocked` 是配置中的静态封闭标记；运行期封闭集合由航线优化器单独维护，
/// 不会改动航道定义本身。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    pub latency: f64,
    #[serde(default = "default_reliability")]
    pub reliability: f64,
    #[serde(default)]
    pub blocked: bool,
}

fn default_reliability() -> f64 {
    1.0
}

impl Channel {
    pub fn new(id: impl Into<String>, latency: f64) -> Self {
        Self {
            id: id.into(),
            latency,
            reliability: default_reliability(),
            blocked: false,
        }
    }

    pub fn with_reliability(mut self, reliability: f64) -> Self {
        self.reliability = reliability;
        self
    }
}

/// Result of a multi-leg plan: one selected channel per leg plus the summed latency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiLegPlan {
    pub channels: Vec<Channel>,
    pub total_latency: f64,
}
