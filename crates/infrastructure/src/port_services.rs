//! 基于港口静态配置的下游服务实现
//!
//! 在没有外部容量/航道服务时使用配置中的潮位与航道目录。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use harbor_core::config::PortConfig;
use harbor_core::{CapacityService, Channel, DispatchRequest, DispatchResult, RouteService};

/// Fixed tide level
#[derive(Debug, Clone)]
pub struct StaticTideService {
    tide_level: f64,
}

impl StaticTideService {
    pub fn new(tide_level: f64) -> Self {
        Self { tide_level }
    }

    pub fn from_config(config: &PortConfig) -> Self {
        Self::new(config.tide_level)
    }
}

#[async_trait]
impl CapacityService for StaticTideService {
    async fn tide_level(&self, _at: DateTime<Utc>) -> DispatchResult<f64> {
        Ok(self.tide_level)
    }
}

/// Every configured channel is a candidate for every request
#[derive(Debug, Clone)]
pub struct StaticRouteCatalog {
    channels: Vec<Channel>,
}

impl StaticRouteCatalog {
    pub fn new(channels: Vec<Channel>) -> Self {
        Self { channels }
    }

    pub fn from_config(config: &PortConfig) -> Self {
        Self::new(config.channels.clone())
    }
}

#[async_trait]
impl RouteService for StaticRouteCatalog {
    async fn candidate_channels(&self, _request: &DispatchRequest) -> DispatchResult<Vec<Channel>> {
        Ok(self.channels.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_services_follow_port_config() {
        let config = PortConfig::default();
        let tide = StaticTideService::from_config(&config);
        assert_eq!(tide.tide_level(Utc::now()).await.unwrap(), config.tide_level);

        let catalog = StaticRouteCatalog::from_config(&config);
        assert_eq!(catalog.channels.len(), config.channels.len());
    }
}
