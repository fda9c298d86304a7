//! 准入控制
//!
//! 根据队列深度、紧急模式、近期削峰率与调用方令牌桶决定是否接收调度请求。

use std::collections::VecDeque;
use std::sync::Arc;

use harbor_core::config::AdmissionConfig;
use harbor_core::{DispatchRequest, DispatchResult, RejectReason};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::rate_limiter::RateLimiterRegistry;

const EMERGENCY_RATIO: f64 = 0.8;

/// Queue health classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueHealth {
    Invalid,
    Critical,
    Warning,
    Elevated,
    Healthy,
}

impl QueueHealth {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueHealth::Invalid => "invalid",
            QueueHealth::Critical => "critical",
            QueueHealth::Warning => "warning",
            QueueHealth::Elevated => "elevated",
            QueueHealth::Healthy => "healthy",
        }
    }
}

/// Load-shedding decision.
///
/// A non-positive hard limit always sheds. In emergency mode the queue is shed from
/// 80% of the hard limit (inclusive); otherwise from the hard limit itself (inclusive).
pub fn should_shed(depth: usize, hard_limit: i64, emergency: bool) -> bool {
    if hard_limit <= 0 {
        return true;
    }
    let depth = depth as f64;
    let limit = hard_limit as f64;
    if emergency && depth >= limit * EMERGENCY_RATIO {
        return true;
    }
    depth >= limit
}

pub fn queue_health(depth: usize, hard_limit: i64) -> QueueHealth {
    if hard_limit <= 0 {
        return QueueHealth::Invalid;
    }
    let ratio = depth as f64 / hard_limit as f64;
    if ratio > 1.0 {
        QueueHealth::Critical
    } else if ratio > 0.8 {
        QueueHealth::Warning
    } else if ratio > 0.6 {
        QueueHealth::Elevated
    } else {
        QueueHealth::Healthy
    }
}

/// Effective queue limit after tightening by the recent shed rate (percent, clamped to 0..=100)
pub fn adaptive_threshold(_depth: usize, hard_limit: i64, recent_shed_rate_percent: f64) -> f64 {
    if hard_limit <= 0 {
        return 0.0;
    }
    let rate = if recent_shed_rate_percent.is_nan() {
        0.0
    } else {
        recent_shed_rate_percent.clamp(0.0, 100.0)
    };
    hard_limit as f64 * (1.0 - rate / 100.0)
}

/// Expected wait in seconds; a non-positive rate gives an unbounded estimate
pub fn estimate_wait_time(depth: usize, processing_rate_per_second: f64) -> f64 {
    if !(processing_rate_per_second > 0.0) {
        return f64::INFINITY;
    }
    depth as f64 / processing_rate_per_second
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum AdmissionDecision {
    Accepted,
    Rejected { reason: RejectReason },
}

impl AdmissionDecision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, AdmissionDecision::Accepted)
    }
}

/// 准入控制器
pub struct AdmissionController {
    config: AdmissionConfig,
    rate_limiter: Arc<RateLimiterRegistry>,
    // true = shed, oldest first
    recent: Mutex<VecDeque<bool>>,
}

impl AdmissionController {
    pub fn new(
        config: AdmissionConfig,
        rate_limiter: Arc<RateLimiterRegistry>,
    ) -> DispatchResult<Self> {
        config.validate()?;
        let capacity = config.shed_window;
        Ok(Self {
            config,
            rate_limiter,
            recent: Mutex::new(VecDeque::with_capacity(capacity)),
        })
    }

    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiterRegistry> {
        &self.rate_limiter
    }

    pub async fn admit(&self, request: &DispatchRequest, depth: usize) -> AdmissionDecision {
        let decision = self.decide(request, depth).await;
        let shed = match &decision {
            AdmissionDecision::Rejected { reason } => {
                !matches!(reason, RejectReason::RateLimited { .. })
            }
            AdmissionDecision::Accepted => false,
        };
        self.remember(shed).await;

        debug!(
            request_id = %request.id,
            caller_id = %request.caller_id,
            depth = depth,
            accepted = decision.is_accepted(),
            "准入判定完成"
        );
        decision
    }

    async fn decide(&self, request: &DispatchRequest, depth: usize) -> AdmissionDecision {
        let hard_limit = self.config.hard_limit;
        if hard_limit <= 0 {
            return rejected(RejectReason::ZeroCapacity);
        }

        if self.config.emergency_mode && should_shed(depth, hard_limit, true) {
            return rejected(if should_shed(depth, hard_limit, false) {
                RejectReason::QueueFull {
                    depth,
                    limit: hard_limit,
                }
            } else {
                RejectReason::EmergencyShed {
                    depth,
                    limit: hard_limit,
                }
            });
        }

        if should_shed(depth, hard_limit, false) {
            return rejected(RejectReason::QueueFull {
                depth,
                limit: hard_limit,
            });
        }

        if self.config.adaptive {
            let shed_rate = self.recent_shed_rate().await;
            // an empty queue always admits, otherwise a fully shed window never recovers
            let effective = adaptive_threshold(depth, hard_limit, shed_rate).max(1.0);
            if depth as f64 >= effective {
                return rejected(RejectReason::QueueFull {
                    depth,
                    limit: effective.ceil() as i64,
                });
            }
        }

        let cost = self.rate_limiter.config().request_cost;
        if !self.rate_limiter.try_acquire(&request.caller_id, cost).await {
            let available = self.rate_limiter.available_tokens(&request.caller_id).await;
            return rejected(RejectReason::RateLimited {
                caller_id: request.caller_id.clone(),
                available,
            });
        }

        AdmissionDecision::Accepted
    }

    async fn remember(&self, shed: bool) {
        let mut recent = self.recent.lock().await;
        if recent.len() == self.config.shed_window {
            recent.pop_front();
        }
        recent.push_back(shed);
    }

    /// Percentage of load-shed decisions in the sliding window
    pub async fn recent_shed_rate(&self) -> f64 {
        let recent = self.recent.lock().await;
        if recent.is_empty() {
            return 0.0;
        }
        let shed = recent.iter().filter(|s| **s).count();
        shed as f64 * 100.0 / recent.len() as f64
    }

    pub fn health(&self, depth: usize) -> QueueHealth {
        queue_health(depth, self.config.hard_limit)
    }

    pub fn estimate_wait(&self, depth: usize) -> f64 {
        estimate_wait_time(depth, self.config.processing_rate_per_second)
    }
}

fn rejected(reason: RejectReason) -> AdmissionDecision {
    AdmissionDecision::Rejected { reason }
}
