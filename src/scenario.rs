//! `plan` 与 `replay` 子命令的输入输出格式

use std::path::Path;

use anyhow::{Context, Result};
use harbor_core::{Allocation, DispatchRequest, ReplayedEvent};
use harbor_dispatcher::AdmissionDecision;
use serde::{Deserialize, Serialize};

/// A batch of requests to admit and schedule in one pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Overrides the configured tide level
    #[serde(default)]
    pub tide_level: Option<f64>,
    /// Overrides `scheduling.default_batch_capacity`
    #[serde(default)]
    pub capacity: Option<usize>,
    pub requests: Vec<DispatchRequest>,
}

impl Scenario {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("读取场景文件失败: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("解析场景文件失败: {}", path.display()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionRecord {
    pub request_id: String,
    #[serde(flatten)]
    pub decision: AdmissionDecision,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanReport {
    pub admissions: Vec<AdmissionRecord>,
    pub allocations: Vec<Allocation>,
    /// Admitted requests still waiting after the pass
    pub queued: usize,
}

pub fn load_events(path: impl AsRef<Path>) -> Result<Vec<ReplayedEvent>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("读取事件文件失败: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("解析事件文件失败: {}", path.display()))
}
