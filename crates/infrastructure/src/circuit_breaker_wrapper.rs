//! Circuit breaker wrappers for downstream capacity and route services

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use harbor_core::{CapacityService, Channel, DispatchRequest, DispatchResult, RouteService};

use crate::circuit_breaker::CircuitBreakerMiddleware;

/// Circuit breaker wrapper for CapacityService
pub struct GuardedCapacityService {
    inner: Arc<dyn CapacityService>,
    circuit_breaker: CircuitBreakerMiddleware,
}

impl GuardedCapacityService {
    pub fn new(inner: Arc<dyn CapacityService>, circuit_breaker: CircuitBreakerMiddleware) -> Self {
        Self {
            inner,
            circuit_breaker,
        }
    }

    pub fn middleware(&self) -> &CircuitBreakerMiddleware {
        &self.circuit_breaker
    }
}

#[async_trait]
impl CapacityService for GuardedCapacityService {
    async fn tide_level(&self, at: DateTime<Utc>) -> DispatchResult<f64> {
        self.circuit_breaker
            .execute("tide_level", || {
                let inner = self.inner.clone();
                async move { inner.tide_level(at).await }
            })
            .await
    }
}

/// Circuit breaker wrapper for RouteService
pub struct GuardedRouteService {
    inner: Arc<dyn RouteService>,
    circuit_breaker: CircuitBreakerMiddleware,
}

impl GuardedRouteService {
    pub fn new(inner: Arc<dyn RouteService>, circuit_breaker: CircuitBreakerMiddleware) -> Self {
        Self {
            inner,
            circuit_breaker,
        }
    }

    pub fn middleware(&self) -> &CircuitBreakerMiddleware {
        &self.circuit_breaker
    }
}

#[async_trait]
impl RouteService for GuardedRouteService {
    async fn candidate_channels(&self, request: &DispatchRequest) -> DispatchResult<Vec<Channel>> {
        self.circuit_breaker
            .execute("candidate_channels", || {
                let inner = self.inner.clone();
                let request = request.clone();
                async move { inner.candidate_channels(&request).await }
            })
            .await
    }
}
