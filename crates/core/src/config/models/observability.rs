use serde::{Deserialize, Serialize};

use crate::errors::{DispatchError, DispatchResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    /// "json", "pretty" or "compact"
    pub log_format: String,
    pub metrics_enabled: bool,
    pub metrics_listen: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_listen: "0.0.0.0:9100".to_string(),
        }
    }
}

impl ObservabilityConfig {
    pub fn validate(&self) -> DispatchResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(DispatchError::InvalidConfiguration(format!(
                "无效的日志级别: {}，支持的级别: {:?}",
                self.log_level, valid_levels
            )));
        }

        let valid_formats = ["json", "pretty", "compact"];
        if !valid_formats.contains(&self.log_format.as_str()) {
            return Err(DispatchError::InvalidConfiguration(format!(
                "无效的日志格式: {}，支持的格式: {:?}",
                self.log_format, valid_formats
            )));
        }

        if self.metrics_enabled && self.metrics_listen.parse::<std::net::SocketAddr>().is_err() {
            return Err(DispatchError::InvalidConfiguration(format!(
                "无效的指标监听地址: {}",
                self.metrics_listen
            )));
        }
        Ok(())
    }
}
