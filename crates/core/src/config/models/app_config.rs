use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    admission::{AdmissionConfig, RateLimiterConfig},
    observability::ObservabilityConfig,
    port::PortConfig,
    resilience::ResilienceConfig,
    scheduling::{CheckpointConfig, RoutingConfig, SchedulingConfig},
};
use crate::errors::DispatchResult;

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub admission: AdmissionConfig,
    pub rate_limiter: RateLimiterConfig,
    pub resilience: ResilienceConfig,
    pub checkpoint: CheckpointConfig,
    pub scheduling: SchedulingConfig,
    pub routing: RoutingConfig,
    pub port: PortConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load configuration from config file and environment variables
    ///
    /// Load order:
    /// 1. Default configuration
    /// 2. Config file (TOML format)
    /// 3. Environment variable overrides (prefix: HARBOR_, nesting: `__`)
    ///
    /// An explicit path that does not exist is an error; without a path the
    /// default locations are probed and skipped when absent.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else {
            let default_paths = [
                "config/harbor.toml",
                "harbor.toml",
                "/etc/harbor/config.toml",
            ];

            if let Some(path) = default_paths.iter().find(|p| Path::new(p).exists()) {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            }
        }

        // Environment variable overrides - highest priority
        builder = builder.add_source(
            Environment::with_prefix("HARBOR")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate().context("配置验证失败")?;

        Ok(config)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;

        config.validate().context("配置验证失败")?;
        Ok(config)
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    /// Validate every section; the first invalid section wins
    pub fn validate(&self) -> DispatchResult<()> {
        self.admission.validate()?;
        self.rate_limiter.validate()?;
        self.resilience.validate()?;
        self.checkpoint.validate()?;
        self.scheduling.validate()?;
        self.routing.validate()?;
        self.port.validate()?;
        self.observability.validate()?;
        Ok(())
    }
}
