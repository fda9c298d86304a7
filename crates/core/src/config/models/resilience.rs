use serde::{Deserialize, Serialize};

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::errors::DispatchResult;

pub const CAPACITY_SERVICE: &str = "capacity-service";
pub const ROUTE_SERVICE: &str = "route-service";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    pub capacity_service: CircuitBreakerConfig,
    pub route_service: CircuitBreakerConfig,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            capacity_service: CircuitBreakerConfig {
                failure_threshold: 5,
                success_threshold: 3,
                recovery_timeout_ms: 30_000,
                call_timeout_ms: 2_000,
                backoff_multiplier: 1.0,
                max_recovery_timeout_ms: 300_000,
            },
            route_service: CircuitBreakerConfig {
                failure_threshold: 3,
                success_threshold: 3,
                recovery_timeout_ms: 45_000,
                call_timeout_ms: 5_000,
                backoff_multiplier: 2.0,
                max_recovery_timeout_ms: 240_000,
            },
        }
    }
}

impl ResilienceConfig {
    pub fn validate(&self) -> DispatchResult<()> {
        self.capacity_service.validate()?;
        self.route_service.validate()?;
        Ok(())
    }

    /// Breaker configuration per downstream service id
    pub fn breakers(&self) -> Vec<(&'static str, CircuitBreakerConfig)> {
        vec![
            (CAPACITY_SERVICE, self.capacity_service.clone()),
            (ROUTE_SERVICE, self.route_service.clone()),
        ]
    }
}
