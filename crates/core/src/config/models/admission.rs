use serde::{Deserialize, Serialize};

use crate::errors::{DispatchError, DispatchResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Queue depth above which requests are shed
    pub hard_limit: i64,
    /// Emergency mode sheds from 80% of the hard limit
    pub emergency_mode: bool,
    /// Expected drain rate used for wait-time estimates
    pub processing_rate_per_second: f64,
    /// Number of recent decisions used to compute the shed rate
    pub shed_window: usize,
    /// Tighten the effective limit by the recent shed rate
    pub adaptive: bool,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            hard_limit: 1000,
            emergency_mode: false,
            processing_rate_per_second: 5.0,
            shed_window: 100,
            adaptive: false,
        }
    }
}

impl AdmissionConfig {
    pub fn validate(&self) -> DispatchResult<()> {
        if self.hard_limit <= 0 {
            return Err(DispatchError::InvalidConfiguration(format!(
                "队列硬上限必须大于0: {}",
                self.hard_limit
            )));
        }
        if self.shed_window == 0 {
            return Err(DispatchError::InvalidConfiguration(
                "削峰统计窗口必须大于0".to_string(),
            ));
        }
        if !self.processing_rate_per_second.is_finite() {
            return Err(DispatchError::InvalidConfiguration(
                "处理速率必须是有限数值".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimiterConfig {
    pub max_tokens: f64,
    pub refill_rate_per_second: f64,
    /// Tokens spent per admitted request
    pub request_cost: f64,
    /// Must be a power of two
    pub shard_count: usize,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_tokens: 20.0,
            refill_rate_per_second: 2.0,
            request_cost: 1.0,
            shard_count: 16,
        }
    }
}

impl RateLimiterConfig {
    pub fn validate(&self) -> DispatchResult<()> {
        if !(self.max_tokens > 0.0) || !self.max_tokens.is_finite() {
            return Err(DispatchError::InvalidConfiguration(format!(
                "令牌桶容量必须大于0: {}",
                self.max_tokens
            )));
        }
        if !(self.refill_rate_per_second >= 0.0) || !self.refill_rate_per_second.is_finite() {
            return Err(DispatchError::InvalidConfiguration(format!(
                "令牌补充速率不能为负: {}",
                self.refill_rate_per_second
            )));
        }
        if !(self.request_cost > 0.0) || self.request_cost > self.max_tokens {
            return Err(DispatchError::InvalidConfiguration(format!(
                "单次请求令牌消耗必须在 (0, {}] 区间内: {}",
                self.max_tokens, self.request_cost
            )));
        }
        if !self.shard_count.is_power_of_two() {
            return Err(DispatchError::InvalidConfiguration(format!(
                "分片数必须是2的幂: {}",
                self.shard_count
            )));
        }
        Ok(())
    }
}
