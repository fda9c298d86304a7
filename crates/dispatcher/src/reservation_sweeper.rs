use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use harbor_core::Clock;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::berth_registry::{BerthRegistry, ExpiredReservation};
use crate::berth_scheduler::BookingCalendar;
use crate::rate_limiter::RateLimiterRegistry;

/// Release expired reservations and cancel their bookings. The caller holds the calendar,
/// so no allocation can slip in between the two steps.
pub(crate) fn reclaim_expired(
    registry: &BerthRegistry,
    calendar: &mut BookingCalendar,
    now: DateTime<Utc>,
) -> Vec<ExpiredReservation> {
    let expired = registry.sweep_expired(now);
    for reservation in &expired {
        let cancelled = calendar.cancel(&reservation.slot_id, &reservation.vessel_id);
        info!(
            slot_id = %reservation.slot_id,
            vessel_id = %reservation.vessel_id,
            booking_cancelled = cancelled,
            "过期预留已回收"
        );
    }
    expired
}

/// 预留过期回收器
///
/// 按固定间隔把过期的泊位预留释放回 `available` 并撤销对应的时间窗预订，
/// 同时清理已结束的预订和已补满的令牌桶。
pub struct ReservationSweeper {
    registry: Arc<BerthRegistry>,
    calendar: Arc<Mutex<BookingCalendar>>,
    rate_limiter: Option<Arc<RateLimiterRegistry>>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    running: Arc<RwLock<bool>>,
}

impl ReservationSweeper {
    pub fn new(
        registry: Arc<BerthRegistry>,
        calendar: Arc<Mutex<BookingCalendar>>,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> Self {
        Self {
            registry,
            calendar,
            rate_limiter: None,
            clock,
            interval,
            running: Arc::new(RwLock::new(false)),
        }
    }

    pub fn with_rate_limiter(mut self, rate_limiter: Arc<RateLimiterRegistry>) -> Self {
        self.rate_limiter = Some(rate_limiter);
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// One sweep pass at the clock's current time
    pub async fn sweep_once(&self) -> Vec<ExpiredReservation> {
        let now = self.clock.now();
        let (expired, pruned) = {
            let mut calendar = self.calendar.lock().await;
            let expired = reclaim_expired(&self.registry, &mut calendar, now);
            (expired, calendar.prune_ended(now))
        };

        let evicted = match &self.rate_limiter {
            Some(rate_limiter) => rate_limiter.evict_refilled().await,
            None => 0,
        };

        debug!(
            expired = expired.len(),
            pruned_bookings = pruned,
            evicted_buckets = evicted,
            "回收轮次完成"
        );
        expired
    }

    /// Run the sweep loop until `stop` is called
    pub async fn start(&self) {
        {
            let mut running = self.running.write().await;
            *running = true;
        }
        info!(interval_ms = self.interval.as_millis() as u64, "启动预留回收循环");

        loop {
            if !*self.running.read().await {
                break;
            }

            self.sweep_once().await;

            tokio::time::sleep(self.interval).await;
        }

        info!("预留回收循环已退出");
    }

    pub async fn stop(&self) {
        info!("停止预留回收循环");
        let mut running = self.running.write().await;
        *running = false;
    }
}
