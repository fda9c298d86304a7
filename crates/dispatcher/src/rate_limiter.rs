//! 令牌桶限流
//!
//! 每个调用方一个令牌桶，按调用方 id 哈希分片到 2 的幂个分片上，每个分片一把锁。
//! 令牌在访问时按流逝时间惰性补充，上限为桶容量。

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use harbor_core::clock::elapsed_seconds;
use harbor_core::config::RateLimiterConfig;
use harbor_core::{Clock, DispatchError, DispatchResult};
use tokio::sync::Mutex;
use tracing::debug;

/// Outcome of a burst acquisition
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BurstOutcome {
    /// The whole burst was granted
    Full,
    /// Not enough tokens: carries what was available; the bucket is now empty
    Partial(f64),
}

#[derive(Debug, Clone)]
pub struct TokenBucket {
    max_tokens: f64,
    refill_rate_per_second: f64,
    tokens: f64,
    last_refill: DateTime<Utc>,
}

impl TokenBucket {
    /// New bucket, initially full
    pub fn new(max_tokens: f64, refill_rate_per_second: f64, now: DateTime<Utc>) -> Self {
        Self {
            max_tokens,
            refill_rate_per_second,
            tokens: max_tokens,
            last_refill: now,
        }
    }

    fn refilled(&self, now: DateTime<Utc>) -> f64 {
        let elapsed = elapsed_seconds(self.last_refill, now);
        (self.tokens + elapsed * self.refill_rate_per_second).min(self.max_tokens)
    }

    fn refill(&mut self, now: DateTime<Utc>) {
        self.tokens = self.refilled(now);
        if now > self.last_refill {
            self.last_refill = now;
        }
    }

    /// Deduct `cost` if at least `cost` tokens are available; otherwise leave the balance alone
    pub fn try_acquire(&mut self, cost: f64, now: DateTime<Utc>) -> bool {
        self.refill(now);
        if self.tokens >= cost {
            self.tokens -= cost;
            true
        } else {
            false
        }
    }

    /// Like `try_acquire`, but a failed burst drains the bucket and reports what it held
    pub fn try_acquire_burst(&mut self, count: f64, now: DateTime<Utc>) -> BurstOutcome {
        self.refill(now);
        if self.tokens >= count {
            self.tokens -= count;
            BurstOutcome::Full
        } else {
            let available = self.tokens;
            self.tokens = 0.0;
            BurstOutcome::Partial(available)
        }
    }

    /// Tokens that would be available at `now`; does not touch the bucket
    pub fn available_tokens(&self, now: DateTime<Utc>) -> f64 {
        self.refilled(now)
    }
}

type Shard = Mutex<HashMap<String, TokenBucket>>;

/// Per-caller token buckets
pub struct RateLimiterRegistry {
    config: RateLimiterConfig,
    clock: Arc<dyn Clock>,
    shards: Vec<Shard>,
}

impl RateLimiterRegistry {
    pub fn new(config: RateLimiterConfig, clock: Arc<dyn Clock>) -> DispatchResult<Self> {
        config.validate()?;
        if !config.shard_count.is_power_of_two() {
            return Err(DispatchError::InvalidConfiguration(format!(
                "分片数必须是2的幂: {}",
                config.shard_count
            )));
        }

        let shards = (0..config.shard_count)
            .map(|_| Mutex::new(HashMap::new()))
            .collect();
        Ok(Self {
            config,
            clock,
            shards,
        })
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    fn shard_for(&self, caller_id: &str) -> &Shard {
        let mut hasher = DefaultHasher::new();
        caller_id.hash(&mut hasher);
        let index = (hasher.finish() as usize) & (self.shards.len() - 1);
        &self.shards[index]
    }

    fn new_bucket(&self, now: DateTime<Utc>) -> TokenBucket {
        TokenBucket::new(
            self.config.max_tokens,
            self.config.refill_rate_per_second,
            now,
        )
    }

    pub async fn try_acquire(&self, caller_id: &str, cost: f64) -> bool {
        let now = self.clock.now();
        let mut shard = self.shard_for(caller_id).lock().await;
        let bucket = shard
            .entry(caller_id.to_string())
            .or_insert_with(|| self.new_bucket(now));
        let acquired = bucket.try_acquire(cost, now);
        if !acquired {
            debug!(
                caller_id = caller_id,
                cost = cost,
                available = bucket.available_tokens(now),
                "令牌不足"
            );
        }
        acquired
    }

    pub async fn try_acquire_burst(&self, caller_id: &str, count: f64) -> BurstOutcome {
        let now = self.clock.now();
        let mut shard = self.shard_for(caller_id).lock().await;
        shard
            .entry(caller_id.to_string())
            .or_insert_with(|| self.new_bucket(now))
            .try_acquire_burst(count, now)
    }

    /// Available tokens for a caller; unknown callers report a full bucket
    pub async fn available_tokens(&self, caller_id: &str) -> f64 {
        let now = self.clock.now();
        let shard = self.shard_for(caller_id).lock().await;
        shard
            .get(caller_id)
            .map(|bucket| bucket.available_tokens(now))
            .unwrap_or(self.config.max_tokens)
    }

    /// Forget callers whose bucket has refilled to capacity; a new bucket starts full anyway.
    /// Returns how many were evicted.
    pub async fn evict_refilled(&self) -> usize {
        let now = self.clock.now();
        let mut evicted = 0;
        for shard in &self.shards {
            let mut shard = shard.lock().await;
            let before = shard.len();
            shard.retain(|_, bucket| bucket.available_tokens(now) < self.config.max_tokens);
            evicted += before - shard.len();
        }
        if evicted > 0 {
            debug!(evicted = evicted, "回收已补满的令牌桶");
        }
        evicted
    }

    pub async fn tracked_callers(&self) -> usize {
        let mut total = 0;
        for shard in &self.shards {
            total += shard.lock().await.len();
        }
        total
    }
}
