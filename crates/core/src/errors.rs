use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 请求被拒绝的原因
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum RejectReason {
    /// Queue depth exceeded the (possibly tightened) admission limit
    QueueFull { depth: usize, limit: i64 },
    /// Emergency mode is on and the queue sits at or above 80% of the hard limit
    EmergencyShed { depth: usize, limit: i64 },
    /// The caller's token bucket could not cover the request cost
    RateLimited { caller_id: String, available: f64 },
    /// Admission is configured with a non-positive hard limit
    ZeroCapacity,
    /// The rolling scheduling window is already at capacity
    WindowFull { window_start: i64, max_per_window: usize },
}

impl RejectReason {
    /// Stable machine-readable code for the reason
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::QueueFull { .. } => "queue_full",
            RejectReason::EmergencyShed { .. } => "emergency_shed",
            RejectReason::RateLimited { .. } => "rate_limited",
            RejectReason::ZeroCapacity => "zero_capacity",
            RejectReason::WindowFull { .. } => "window_full",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::QueueFull { depth, limit } => {
                write!(f, "queue_full (depth {depth}, limit {limit})")
            }
            RejectReason::EmergencyShed { depth, limit } => {
                write!(f, "emergency_shed (depth {depth}, limit {limit})")
            }
            RejectReason::RateLimited {
                caller_id,
                available,
            } => write!(f, "rate_limited (caller {caller_id}, available {available:.2})"),
            RejectReason::ZeroCapacity => write!(f, "zero_capacity"),
            RejectReason::WindowFull {
                window_start,
                max_per_window,
            } => write!(
                f,
                "window_full (window {window_start}, max {max_per_window})"
            ),
        }
    }
}

/// 调度核心错误类型定义
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("请求被拒绝: {reason}")]
    Rejected { reason: RejectReason },

    #[error("配置无效: {0}")]
    InvalidConfiguration(String),

    #[error("无可用航道{}: {reason}", .leg.map(|l| format!(" (航段 {l})")).unwrap_or_default())]
    NoRouteAvailable { leg: Option<usize>, reason: String },

    #[error("无可用泊位{}: {reason}", .slot_id.as_ref().map(|s| format!(" ({s})")).unwrap_or_default())]
    NoBerthAvailable {
        slot_id: Option<String>,
        reason: String,
    },

    #[error("熔断器已打开: {service}")]
    CircuitOpen {
        service: String,
        retry_after: Option<Duration>,
    },

    #[error("回放结果不一致: 左侧 {left_len} 条, 右侧 {right_len} 条, 首个差异位置 {first_mismatch:?}")]
    ReplayDivergence {
        left_len: usize,
        right_len: usize,
        first_mismatch: Option<usize>,
    },

    #[error("泊位冲突: {slot_id} 当前由 {holder:?} 持有")]
    BerthConflict {
        slot_id: String,
        holder: Option<String>,
    },

    #[error("下游调用超时: {service} ({timeout:?})")]
    Timeout { service: String, timeout: Duration },

    #[error("下游服务错误: {0}")]
    Downstream(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl DispatchError {
    pub fn rejected(reason: RejectReason) -> Self {
        DispatchError::Rejected { reason }
    }

    pub fn no_route(leg: Option<usize>, reason: impl Into<String>) -> Self {
        DispatchError::NoRouteAvailable {
            leg,
            reason: reason.into(),
        }
    }

    pub fn no_berth(slot_id: Option<String>, reason: impl Into<String>) -> Self {
        DispatchError::NoBerthAvailable {
            slot_id,
            reason: reason.into(),
        }
    }

    /// Fatal errors halt automated processing and need an operator
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DispatchError::InvalidConfiguration(_) | DispatchError::ReplayDivergence { .. }
        )
    }

    /// Whether the caller may retry the same operation later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DispatchError::CircuitOpen { .. }
                | DispatchError::Timeout { .. }
                | DispatchError::Downstream(_)
                | DispatchError::NoBerthAvailable { .. }
        )
    }
}

impl From<serde_json::Error> for DispatchError {
    fn from(e: serde_json::Error) -> Self {
        DispatchError::Serialization(e.to_string())
    }
}

/// 统一的Result类型
pub type DispatchResult<T> = std::result::Result<T, DispatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reject_reason_codes() {
        let reason = RejectReason::WindowFull {
            window_start: 0,
            max_per_window: 2,
        };
        assert_eq!(reason.code(), "window_full");
        assert_eq!(RejectReason::ZeroCapacity.code(), "zero_capacity");
    }

    #[test]
    fn test_error_classification() {
        assert!(DispatchError::InvalidConfiguration("x".into()).is_fatal());
        assert!(DispatchError::ReplayDivergence {
            left_len: 1,
            right_len: 2,
            first_mismatch: Some(0)
        }
        .is_fatal());
        assert!(!DispatchError::rejected(RejectReason::ZeroCapacity).is_retryable());
        assert!(DispatchError::CircuitOpen {
            service: "tide".into(),
            retry_after: None
        }
        .is_retryable());
    }

    #[test]
    fn test_no_route_message_names_leg() {
        let err = DispatchError::no_route(Some(2), "all candidates blocked");
        assert!(err.to_string().contains("2"));
        assert!(err.to_string().contains("all candidates blocked"));
    }
}
