//! 熔断器注册表与调用中间件
//!
//! 每个下游服务在进程生命周期内只有一个熔断器实例；注册表负责创建、查找、
//! 快照与恢复。中间件在调用前后比较状态，状态变化时输出结构化日志和指标。

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use harbor_core::config::ResilienceConfig;
use harbor_core::{
    BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, CircuitState, Clock, DispatchResult,
};
use tokio::sync::RwLock;
use tracing::debug;

use crate::observability::{MetricsCollector, StructuredLogger};

/// One breaker per downstream service id
pub struct CircuitBreakerRegistry {
    clock: Arc<dyn Clock>,
    default_config: CircuitBreakerConfig,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerRegistry {
    pub fn new(clock: Arc<dyn Clock>, default_config: CircuitBreakerConfig) -> Self {
        Self {
            clock,
            default_config,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    /// Registry pre-populated with the configured downstream services
    pub async fn from_config(
        config: &ResilienceConfig,
        clock: Arc<dyn Clock>,
    ) -> DispatchResult<Self> {
        config.validate()?;
        let registry = Self::new(clock, CircuitBreakerConfig::default());
        for (service_id, breaker_config) in config.breakers() {
            registry.register(service_id, breaker_config).await;
        }
        Ok(registry)
    }

    /// Register a breaker, replacing any existing one for the same service
    pub async fn register(
        &self,
        service_id: &str,
        config: CircuitBreakerConfig,
    ) -> Arc<CircuitBreaker> {
        let breaker = Arc::new(CircuitBreaker::with_clock(
            service_id,
            config,
            self.clock.clone(),
        ));
        self.breakers
            .write()
            .await
            .insert(service_id.to_string(), breaker.clone());
        breaker
    }

    pub async fn get(&self, service_id: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.read().await.get(service_id).cloned()
    }

    /// Get the breaker for a service, creating it with the default configuration
    pub async fn get_or_create(&self, service_id: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.read().await.get(service_id) {
            return breaker.clone();
        }

        let mut breakers = self.breakers.write().await;
        // another task may have created it between the two locks
        breakers
            .entry(service_id.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::with_clock(
                    service_id,
                    self.default_config.clone(),
                    self.clock.clone(),
                ))
            })
            .clone()
    }

    pub async fn service_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.breakers.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Persisted recovery shape: service id -> {state, failure_count, last_failure_at}
    pub async fn snapshot_all(&self) -> BTreeMap<String, BreakerSnapshot> {
        let breakers: Vec<Arc<CircuitBreaker>> =
            self.breakers.read().await.values().cloned().collect();
        let mut snapshots = BTreeMap::new();
        for breaker in breakers {
            let snapshot = breaker.snapshot().await;
            snapshots.insert(snapshot.service_id.clone(), snapshot);
        }
        snapshots
    }

    /// Restore persisted snapshots. Unknown services get a default-configured breaker.
    pub async fn restore_all(
        &self,
        snapshots: &BTreeMap<String, BreakerSnapshot>,
    ) -> DispatchResult<()> {
        for (service_id, snapshot) in snapshots {
            let breaker = self.get_or_create(service_id).await;
            breaker.restore(snapshot).await?;
        }
        Ok(())
    }

    /// Operator reset; returns false when the service is unknown
    pub async fn reset(&self, service_id: &str) -> bool {
        match self.get(service_id).await {
            Some(breaker) => {
                breaker.reset().await;
                true
            }
            None => false,
        }
    }
}

/// Calls a downstream operation through a breaker and reports state changes
#[derive(Clone)]
pub struct CircuitBreakerMiddleware {
    circuit_breaker: Arc<CircuitBreaker>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl CircuitBreakerMiddleware {
    pub fn new(circuit_breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            circuit_breaker,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.circuit_breaker
    }

    pub async fn execute<F, Fut, T>(&self, operation_name: &str, operation: F) -> DispatchResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = DispatchResult<T>>,
    {
        let service_id = self.circuit_breaker.service_id();
        debug!(
            service = service_id,
            operation = operation_name,
            "Executing downstream call through circuit breaker"
        );

        let before = self.circuit_breaker.get_state().await;
        let result = self.circuit_breaker.execute(operation).await;
        let after = self.circuit_breaker.get_state().await;

        if before != after {
            StructuredLogger::log_breaker_transition(service_id, before, after);
            if let Some(metrics) = &self.metrics {
                metrics.record_breaker_transition(service_id, state_label(after));
            }
        }

        if let Err(e) = &result {
            StructuredLogger::log_system_error(service_id, operation_name, e);
        }

        result
    }
}

fn state_label(state: CircuitState) -> &'static str {
    match state {
        CircuitState::Closed => "closed",
        CircuitState::Open => "open",
        CircuitState::HalfOpen => "half_open",
    }
}
