use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::errors::{DispatchError, DispatchResult};
use crate::models::{BerthSlot, Channel};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BerthConfig {
    pub id: String,
    pub max_draft: f64,
    pub max_length: f64,
}

impl BerthConfig {
    pub fn to_slot(&self) -> BerthSlot {
        BerthSlot::new(self.id.clone(), self.max_draft, self.max_length)
    }
}

/// 港口静态配置：泊位、航道目录与静态潮位
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortConfig {
    pub name: String,
    pub berths: Vec<BerthConfig>,
    pub channels: Vec<Channel>,
    pub tide_level: f64,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            name: "harbor".to_string(),
            berths: vec![
                BerthConfig {
                    id: "B1".to_string(),
                    max_draft: 14.0,
                    max_length: 300.0,
                },
                BerthConfig {
                    id: "B2".to_string(),
                    max_draft: 11.0,
                    max_length: 220.0,
                },
                BerthConfig {
                    id: "B3".to_string(),
                    max_draft: 8.5,
                    max_length: 150.0,
                },
            ],
            channels: vec![
                Channel::new("north", 42.0).with_reliability(0.97),
                Channel::new("south", 35.0).with_reliability(0.9),
                Channel::new("east", 58.0).with_reliability(0.99),
            ],
            tide_level: 1.5,
        }
    }
}

impl PortConfig {
    pub fn validate(&self) -> DispatchResult<()> {
        let mut seen = HashSet::new();
        for berth in &self.berths {
            if berth.id.is_empty() {
                return Err(DispatchError::InvalidConfiguration(
                    "泊位ID不能为空".to_string(),
                ));
            }
            if !seen.insert(berth.id.as_str()) {
                return Err(DispatchError::InvalidConfiguration(format!(
                    "泊位ID重复: {}",
                    berth.id
                )));
            }
            if !(berth.max_draft > 0.0) || !(berth.max_length > 0.0) {
                return Err(DispatchError::InvalidConfiguration(format!(
                    "泊位 {} 的吃水与长度上限必须大于0",
                    berth.id
                )));
            }
        }

        let mut seen = HashSet::new();
        for channel in &self.channels {
            if !seen.insert(channel.id.as_str()) {
                return Err(DispatchError::InvalidConfiguration(format!(
                    "航道ID重复: {}",
                    channel.id
                )));
            }
        }

        if !self.tide_level.is_finite() {
            return Err(DispatchError::InvalidConfiguration(
                "潮位必须是有限数值".to_string(),
            ));
        }
        Ok(())
    }

    pub fn berth_slots(&self) -> Vec<BerthSlot> {
        self.berths.iter().map(BerthConfig::to_slot).collect()
    }
}
