use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::errors::{DispatchError, DispatchResult};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Circuit is closed - normal operation
    Closed,
    /// Circuit is open - calls are blocked
    Open,
    /// Circuit is half-open - trial calls decide whether the dependency recovered
    HalfOpen,
}

/// Upper bound accepted for `backoff_multiplier`
pub const MAX_BACKOFF_MULTIPLIER: f64 = 100.0;

/// Circuit breaker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit (opens on reaching, not exceeding)
    pub failure_threshold: usize,
    /// Consecutive half-open successes that close the circuit
    pub success_threshold: usize,
    /// Time since the last failure before an open circuit goes half-open
    pub recovery_timeout_ms: u64,
    /// Maximum time a guarded downstream call may take
    pub call_timeout_ms: u64,
    /// Multiplier applied to the recovery timeout after a failed half-open trial.
    /// 1.0 keeps the recovery timeout fixed.
    pub backoff_multiplier: f64,
    /// Maximum recovery timeout
    pub max_recovery_timeout_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            recovery_timeout_ms: 30_000,
            call_timeout_ms: 5_000,
            backoff_multiplier: 1.0,
            max_recovery_timeout_ms: 300_000, // 5 minutes
        }
    }
}

impl CircuitBreakerConfig {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.recovery_timeout_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn max_recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.max_recovery_timeout_ms)
    }

    pub fn validate(&self) -> DispatchResult<()> {
        if self.failure_threshold == 0 {
            return Err(DispatchError::InvalidConfiguration(
                "熔断失败阈值必须大于0".to_string(),
            ));
        }
        if self.success_threshold == 0 {
            return Err(DispatchError::InvalidConfiguration(
                "熔断恢复成功阈值必须大于0".to_string(),
            ));
        }
        if self.call_timeout_ms == 0 {
            return Err(DispatchError::InvalidConfiguration(
                "下游调用超时时间必须大于0".to_string(),
            ));
        }
        if !(1.0..=MAX_BACKOFF_MULTIPLIER).contains(&self.backoff_multiplier) {
            return Err(DispatchError::InvalidConfiguration(format!(
                "退避倍数必须在 [1.0, {MAX_BACKOFF_MULTIPLIER}] 区间内: {}",
                self.backoff_multiplier
            )));
        }
        if self.max_recovery_timeout_ms < self.recovery_timeout_ms {
            return Err(DispatchError::InvalidConfiguration(
                "最大恢复时间不能小于恢复时间".to_string(),
            ));
        }
        Ok(())
    }
}

/// Circuit breaker statistics
#[derive(Debug, Clone)]
pub struct CircuitBreakerStats {
    /// Current state
    pub state: CircuitState,
    /// Number of consecutive failures
    pub consecutive_failures: usize,
    /// Number of consecutive successes (only meaningful while half-open)
    pub consecutive_successes: usize,
    /// Total calls made
    pub total_calls: u64,
    /// Total successful calls
    pub successful_calls: u64,
    /// Total failed calls
    pub failed_calls: u64,
    /// Timestamp of the most recent failure
    pub last_failure_at: Option<DateTime<Utc>>,
    /// Last state change time
    pub last_state_change: DateTime<Utc>,
    /// Current recovery timeout
    pub current_recovery_timeout: Duration,
    /// Context recorded with the most recent failure
    pub last_error: Option<String>,
}

impl CircuitBreakerStats {
    pub fn new(config: &CircuitBreakerConfig, now: DateTime<Utc>) -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            total_calls: 0,
            successful_calls: 0,
            failed_calls: 0,
            last_failure_at: None,
            last_state_change: now,
            current_recovery_timeout: config.recovery_timeout(),
            last_error: None,
        }
    }

    /// Calculate failure rate
    pub fn failure_rate(&self) -> f64 {
        if self.total_calls == 0 {
            0.0
        } else {
            self.failed_calls as f64 / self.total_calls as f64
        }
    }

    /// Calculate success rate
    pub fn success_rate(&self) -> f64 {
        if self.total_calls == 0 {
            0.0
        } else {
            self.successful_calls as f64 / self.total_calls as f64
        }
    }
}

/// Persisted breaker shape used for recovery after restart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    pub service_id: String,
    pub state: CircuitState,
    pub failure_count: usize,
    pub last_failure_at: Option<DateTime<Utc>>,
}

/// Circuit breaker guarding one downstream dependency.
///
/// The breaker tracks state only; limiting how many trial calls run concurrently
/// while half-open is left to the caller.
pub struct CircuitBreaker {
    service_id: String,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    stats: Arc<RwLock<CircuitBreakerStats>>,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("service_id", &self.service_id)
            .field("config", &self.config)
            .finish()
    }
}

impl CircuitBreaker {
    /// Create new circuit breaker with default configuration
    pub fn new(service_id: impl Into<String>) -> Self {
        Self::with_config(service_id, CircuitBreakerConfig::default())
    }

    /// Create new circuit breaker with custom configuration
    pub fn with_config(service_id: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self::with_clock(service_id, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        service_id: impl Into<String>,
        config: CircuitBreakerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let stats = CircuitBreakerStats::new(&config, clock.now());
        Self {
            service_id: service_id.into(),
            config,
            clock,
            stats: Arc::new(RwLock::new(stats)),
        }
    }

    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Execute a downstream call with circuit breaker protection and the call timeout
    pub async fn execute<F, Fut, T>(&self, operation: F) -> DispatchResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = DispatchResult<T>>,
    {
        if !self.is_allowed().await {
            return Err(DispatchError::CircuitOpen {
                service: self.service_id.clone(),
                retry_after: self.retry_after().await,
            });
        }

        let timeout = self.config.call_timeout();
        match tokio::time::timeout(timeout, operation()).await {
            Ok(Ok(result)) => {
                self.record_success().await;
                Ok(result)
            }
            Ok(Err(error)) => {
                self.record_failure_with_context(&error.to_string()).await;
                Err(error)
            }
            Err(_) => {
                self.record_failure_with_context("timeout").await;
                Err(DispatchError::Timeout {
                    service: self.service_id.clone(),
                    timeout,
                })
            }
        }
    }

    /// Whether a call may be forwarded. An open circuit whose recovery time has
    /// elapsed moves to half-open here.
    pub async fn is_allowed(&self) -> bool {
        let mut stats = self.stats.write().await;

        match stats.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let now = self.clock.now();
                if self.recovery_elapsed(&stats, now) {
                    stats.state = CircuitState::HalfOpen;
                    stats.consecutive_successes = 0;
                    stats.last_state_change = now;
                    info!(
                        service = %self.service_id,
                        from = "open",
                        to = "half_open",
                        "circuit breaker transition"
                    );
                    true
                } else {
                    false
                }
            }
        }
    }

    fn recovery_elapsed(&self, stats: &CircuitBreakerStats, now: DateTime<Utc>) -> bool {
        match stats.last_failure_at {
            Some(last_failure) => {
                let elapsed = (now - last_failure).to_std().unwrap_or(Duration::ZERO);
                elapsed >= stats.current_recovery_timeout
            }
            None => true,
        }
    }

    /// Remaining time before an open circuit may go half-open
    pub async fn retry_after(&self) -> Option<Duration> {
        let stats = self.stats.read().await;
        if stats.state != CircuitState::Open {
            return None;
        }
        let last_failure = stats.last_failure_at?;
        let elapsed = (self.clock.now() - last_failure)
            .to_std()
            .unwrap_or(Duration::ZERO);
        Some(stats.current_recovery_timeout.saturating_sub(elapsed))
    }

    /// Record successful call
    pub async fn record_success(&self) {
        let mut stats = self.stats.write().await;

        stats.total_calls += 1;
        stats.successful_calls += 1;

        match stats.state {
            CircuitState::Closed => {
                // Isolated failures fade out one success at a time
                stats.consecutive_failures = stats.consecutive_failures.saturating_sub(1);
            }
            CircuitState::HalfOpen => {
                stats.consecutive_successes += 1;
                if stats.consecutive_successes >= self.config.success_threshold {
                    stats.state = CircuitState::Closed;
                    stats.consecutive_failures = 0;
                    stats.consecutive_successes = 0;
                    stats.last_state_change = self.clock.now();
                    stats.current_recovery_timeout = self.config.recovery_timeout();
                    info!(
                        service = %self.service_id,
                        from = "half_open",
                        to = "closed",
                        "circuit breaker transition"
                    );
                }
            }
            CircuitState::Open => {
                debug!(service = %self.service_id, "success reported while circuit is open");
            }
        }
    }

    /// Record failed call
    pub async fn record_failure(&self) {
        self.record_failure_inner(None).await;
    }

    /// Record failed call, keeping the context as the last error
    pub async fn record_failure_with_context(&self, context: &str) {
        self.record_failure_inner(Some(context.to_string())).await;
    }

    async fn record_failure_inner(&self, context: Option<String>) {
        let mut stats = self.stats.write().await;
        let now = self.clock.now();

        stats.total_calls += 1;
        stats.failed_calls += 1;
        stats.consecutive_failures += 1;
        stats.last_failure_at = Some(now);
        if context.is_some() {
            stats.last_error = context;
        }

        match stats.state {
            CircuitState::Closed => {
                if stats.consecutive_failures >= self.config.failure_threshold {
                    stats.state = CircuitState::Open;
                    stats.last_state_change = now;
                    stats.current_recovery_timeout = self.config.recovery_timeout();
                    warn!(
                        service = %self.service_id,
                        failures = stats.consecutive_failures,
                        last_error = ?stats.last_error,
                        from = "closed",
                        to = "open",
                        "circuit breaker transition"
                    );
                }
            }
            CircuitState::HalfOpen => {
                // Any failed trial re-opens the circuit immediately
                stats.state = CircuitState::Open;
                stats.consecutive_successes = 0;
                stats.last_state_change = now;
                stats.current_recovery_timeout = scaled_recovery_timeout(
                    stats.current_recovery_timeout,
                    self.config.backoff_multiplier,
                    self.config.max_recovery_timeout(),
                );
                warn!(
                    service = %self.service_id,
                    recovery_ms = stats.current_recovery_timeout.as_millis() as u64,
                    from = "half_open",
                    to = "open",
                    "circuit breaker transition"
                );
            }
            CircuitState::Open => {}
        }
    }

    /// Get current circuit state
    pub async fn get_state(&self) -> CircuitState {
        self.stats.read().await.state
    }

    /// Get circuit breaker statistics
    pub async fn get_stats(&self) -> CircuitBreakerStats {
        self.stats.read().await.clone()
    }

    pub async fn snapshot(&self) -> BreakerSnapshot {
        let stats = self.stats.read().await;
        BreakerSnapshot {
            service_id: self.service_id.clone(),
            state: stats.state,
            failure_count: stats.consecutive_failures,
            last_failure_at: stats.last_failure_at,
        }
    }

    /// Restore persisted state after a restart
    pub async fn restore(&self, snapshot: &BreakerSnapshot) -> DispatchResult<()> {
        if snapshot.service_id != self.service_id {
            return Err(DispatchError::Internal(format!(
                "snapshot for {} applied to breaker {}",
                snapshot.service_id, self.service_id
            )));
        }
        let mut stats = self.stats.write().await;
        stats.state = snapshot.state;
        stats.consecutive_failures = snapshot.failure_count;
        stats.consecutive_successes = 0;
        stats.last_failure_at = snapshot.last_failure_at;
        stats.last_state_change = self.clock.now();
        stats.current_recovery_timeout = self.config.recovery_timeout();
        Ok(())
    }

    /// Operator reset back to closed
    pub async fn reset(&self) {
        let mut stats = self.stats.write().await;
        *stats = CircuitBreakerStats::new(&self.config, self.clock.now());
        info!(service = %self.service_id, "circuit breaker reset by operator");
    }

    /// Force open circuit (maintenance)
    pub async fn force_open(&self) {
        let mut stats = self.stats.write().await;
        let now = self.clock.now();
        stats.state = CircuitState::Open;
        stats.last_failure_at = Some(now);
        stats.last_state_change = now;
    }
}

/// Next recovery timeout after a failed half-open trial, capped at `max`.
/// Products that do not fit a `Duration` saturate at the cap.
fn scaled_recovery_timeout(current: Duration, multiplier: f64, max: Duration) -> Duration {
    Duration::try_from_secs_f64(current.as_secs_f64() * multiplier)
        .map(|scaled| scaled.min(max))
        .unwrap_or(max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn breaker(threshold: usize, recovery_ms: u64) -> (CircuitBreaker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let config = CircuitBreakerConfig {
            failure_threshold: threshold,
            recovery_timeout_ms: recovery_ms,
            success_threshold: 3,
            ..Default::default()
        };
        (
            CircuitBreaker::with_clock("tide-service", config, clock.clone()),
            clock,
        )
    }

    #[tokio::test]
    async fn test_circuit_breaker_closed_state() {
        let cb = CircuitBreaker::new("route-service");

        assert_eq!(cb.get_state().await, CircuitState::Closed);

        let result = cb.execute(|| async { Ok::<(), DispatchError>(()) }).await;
        assert!(result.is_ok());
        assert_eq!(cb.get_state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_opens_exactly_at_threshold() {
        let (cb, _clock) = breaker(3, 1_000);

        cb.record_failure().await;
        cb.record_failure().await;
        assert_eq!(cb.get_state().await, CircuitState::Closed);
        assert!(cb.is_allowed().await);

        cb.record_failure().await;
        assert_eq!(cb.get_state().await, CircuitState::Open);
        assert!(!cb.is_allowed().await);
    }

    #[tokio::test]
    async fn test_success_decays_failures_in_closed_state() {
        let (cb, _clock) = breaker(3, 1_000);

        cb.record_failure().await;
        cb.record_failure().await;
        cb.record_success().await;
        assert_eq!(cb.get_stats().await.consecutive_failures, 1);

        cb.record_success().await;
        cb.record_success().await;
        assert_eq!(cb.get_stats().await.consecutive_failures, 0);

        // two more failures are not enough after the decay
        cb.record_failure().await;
        cb.record_failure().await;
        assert_eq!(cb.get_state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_after_recovery_time_inclusive() {
        let (cb, clock) = breaker(1, 1_000);

        cb.record_failure().await;
        assert_eq!(cb.get_state().await, CircuitState::Open);

        clock.advance(chrono::Duration::milliseconds(999));
        assert!(!cb.is_allowed().await);

        clock.advance(chrono::Duration::milliseconds(1));
        assert!(cb.is_allowed().await);
        assert_eq!(cb.get_state().await, CircuitState::HalfOpen);
    }

    #[tokio::test]
    async fn test_half_open_closes_after_success_threshold() {
        let (cb, clock) = breaker(2, 500);

        cb.record_failure().await;
        cb.record_failure().await;
        clock.advance(chrono::Duration::milliseconds(500));
        assert!(cb.is_allowed().await);

        cb.record_success().await;
        cb.record_success().await;
        assert_eq!(cb.get_state().await, CircuitState::HalfOpen);
        cb.record_success().await;
        assert_eq!(cb.get_state().await, CircuitState::Closed);
        assert_eq!(cb.get_stats().await.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens_and_resets_successes() {
        let (cb, clock) = breaker(1, 500);

        cb.record_failure().await;
        clock.advance(chrono::Duration::milliseconds(600));
        assert!(cb.is_allowed().await);
        cb.record_success().await;
        cb.record_success().await;

        cb.record_failure_with_context("berth feed unavailable").await;
        let stats = cb.get_stats().await;
        assert_eq!(stats.state, CircuitState::Open);
        assert_eq!(stats.consecutive_successes, 0);
        assert_eq!(stats.last_error.as_deref(), Some("berth feed unavailable"));
    }

    #[tokio::test]
    async fn test_execute_rejects_when_open() {
        let (cb, _clock) = breaker(1, 60_000);

        let _: DispatchResult<()> = cb
            .execute(|| async { Err(DispatchError::Downstream("boom".to_string())) })
            .await;

        let result = cb.execute(|| async { Ok::<(), DispatchError>(()) }).await;
        match result {
            Err(DispatchError::CircuitOpen {
                service,
                retry_after,
            }) => {
                assert_eq!(service, "tide-service");
                assert_eq!(retry_after, Some(Duration::from_millis(60_000)));
            }
            other => panic!("expected CircuitOpen, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_execute_timeout_counts_as_failure() {
        let config = CircuitBreakerConfig {
            call_timeout_ms: 20,
            ..Default::default()
        };
        let cb = CircuitBreaker::with_config("slow-service", config);

        let result = cb
            .execute(|| async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok::<(), DispatchError>(())
            })
            .await;

        assert!(matches!(result, Err(DispatchError::Timeout { .. })));
        let stats = cb.get_stats().await;
        assert_eq!(stats.consecutive_failures, 1);
        assert_eq!(stats.last_error.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn test_backoff_multiplier_caps_at_max() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let config = CircuitBreakerConfig {
            failure_threshold: 1,
            recovery_timeout_ms: 100,
            backoff_multiplier: 2.0,
            max_recovery_timeout_ms: 300,
            ..Default::default()
        };
        let cb = CircuitBreaker::with_clock("svc", config, clock.clone());

        cb.record_failure().await;
        for expected in [200u64, 300, 300] {
            clock.advance(chrono::Duration::milliseconds(1_000));
            assert!(cb.is_allowed().await);
            cb.record_failure().await;
            assert_eq!(
                cb.get_stats().await.current_recovery_timeout,
                Duration::from_millis(expected)
            );
        }
    }

    #[tokio::test]
    async fn test_snapshot_restore() {
        let (cb, clock) = breaker(2, 1_000);
        cb.record_failure().await;
        cb.record_failure().await;
        let snapshot = cb.snapshot().await;
        assert_eq!(snapshot.state, CircuitState::Open);
        assert_eq!(snapshot.failure_count, 2);

        let restored = CircuitBreaker::with_clock(
            "tide-service",
            CircuitBreakerConfig {
                failure_threshold: 2,
                recovery_timeout_ms: 1_000,
                ..Default::default()
            },
            clock.clone(),
        );
        restored.restore(&snapshot).await.unwrap();
        assert_eq!(restored.get_state().await, CircuitState::Open);
        assert!(!restored.is_allowed().await);

        let foreign = CircuitBreaker::new("other");
        assert!(foreign.restore(&snapshot).await.is_err());
    }

    #[tokio::test]
    async fn test_reset_and_force_open() {
        let (cb, _clock) = breaker(5, 1_000);
        cb.force_open().await;
        assert!(!cb.is_allowed().await);
        cb.reset().await;
        assert_eq!(cb.get_state().await, CircuitState::Closed);
        assert_eq!(cb.get_stats().await.total_calls, 0);
    }

    #[test]
    fn test_config_validation() {
        assert!(CircuitBreakerConfig::default().validate().is_ok());
        let bad = CircuitBreakerConfig {
            failure_threshold: 0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        let bad_backoff = CircuitBreakerConfig {
            backoff_multiplier: 0.5,
            ..Default::default()
        };
        assert!(bad_backoff.validate().is_err());

        for multiplier in [f64::INFINITY, f64::NAN, 1e300] {
            let config = CircuitBreakerConfig {
                backoff_multiplier: multiplier,
                ..Default::default()
            };
            assert!(config.validate().is_err(), "{multiplier} accepted");
        }
    }

    #[test]
    fn test_scaled_recovery_timeout_saturates_at_cap() {
        let max = Duration::from_secs(60);
        assert_eq!(
            scaled_recovery_timeout(Duration::from_secs(10), 2.0, max),
            Duration::from_secs(20)
        );
        assert_eq!(scaled_recovery_timeout(Duration::from_secs(40), 2.0, max), max);
        assert_eq!(scaled_recovery_timeout(Duration::MAX, 100.0, max), max);
        assert_eq!(scaled_recovery_timeout(Duration::from_secs(1), f64::INFINITY, max), max);
    }
}
