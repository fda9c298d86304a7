//! 泊位调度
//!
//! - `plan_window`: 按紧急度降序、ETA 升序选出本批次的船舶
//! - `RollingWindowScheduler`: 固定时间窗内的分配数量上限
//! - `BookingCalendar`: 每个泊位的半开区间 `[start, end)` 预订表

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Utc};
use harbor_core::{DispatchError, DispatchRequest, DispatchResult, RejectReason, TimeWindow};
use tracing::debug;

/// Top `capacity` vessels by urgency (descending), ETA ascending on ties.
/// Equal urgency and ETA keep their input order.
pub fn plan_window(vessels: &[DispatchRequest], capacity: usize) -> Vec<DispatchRequest> {
    let mut ordered: Vec<&DispatchRequest> = vessels.iter().collect();
    ordered.sort_by(|a, b| {
        b.urgency
            .total_cmp(&a.urgency)
            .then_with(|| a.eta.cmp(&b.eta))
    });
    ordered.into_iter().take(capacity).cloned().collect()
}

/// Allocation count limiter over fixed, epoch-aligned time buckets
#[derive(Debug, Clone)]
pub struct RollingWindowScheduler {
    window: Duration,
    max_per_window: usize,
    // bucket index -> allocations in that bucket
    buckets: BTreeMap<i64, usize>,
}

impl RollingWindowScheduler {
    pub fn new(window: Duration, max_per_window: usize) -> DispatchResult<Self> {
        if window <= Duration::zero() {
            return Err(DispatchError::InvalidConfiguration(
                "调度窗口长度必须大于0".to_string(),
            ));
        }
        Ok(Self {
            window,
            max_per_window,
            buckets: BTreeMap::new(),
        })
    }

    fn window_millis(&self) -> i64 {
        self.window.num_milliseconds().max(1)
    }

    fn bucket_index(&self, at: DateTime<Utc>) -> i64 {
        at.timestamp_millis().div_euclid(self.window_millis())
    }

    /// Drop buckets that start more than two windows before `now`
    pub fn purge(&mut self, now: DateTime<Utc>) {
        let window_ms = self.window_millis();
        let cutoff_ms = now.timestamp_millis() - 2 * window_ms;
        let first_kept = cutoff_ms.div_euclid(window_ms)
            + i64::from(cutoff_ms.rem_euclid(window_ms) != 0);
        let kept = self.buckets.split_off(&first_kept);
        let purged = self.buckets.len();
        self.buckets = kept;
        if purged > 0 {
            debug!(purged = purged, "清理过期调度窗口");
        }
    }

    pub fn count_at(&self, at: DateTime<Utc>) -> usize {
        self.buckets
            .get(&self.bucket_index(at))
            .copied()
            .unwrap_or(0)
    }

    /// A bucket at exactly `max_per_window` is full
    pub fn can_schedule(&mut self, at: DateTime<Utc>) -> bool {
        self.purge(at);
        self.count_at(at) < self.max_per_window
    }

    pub fn schedule(&mut self, at: DateTime<Utc>) -> DispatchResult<()> {
        if !self.can_schedule(at) {
            let index = self.bucket_index(at);
            return Err(DispatchError::rejected(RejectReason::WindowFull {
                window_start: index * self.window_millis(),
                max_per_window: self.max_per_window,
            }));
        }
        *self.buckets.entry(self.bucket_index(at)).or_insert(0) += 1;
        Ok(())
    }

    /// Undo one allocation counted at `at`
    pub fn unschedule(&mut self, at: DateTime<Utc>) {
        let index = self.bucket_index(at);
        if let Some(count) = self.buckets.get_mut(&index) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.buckets.remove(&index);
            }
        }
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Booking {
    pub window: TimeWindow,
    pub request_id: String,
}

/// Per-berth bookings keyed by start time; bookings on one berth never overlap
#[derive(Debug, Default, Clone)]
pub struct BookingCalendar {
    berths: HashMap<String, BTreeMap<DateTime<Utc>, Booking>>,
}

impl BookingCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    fn conflict(&self, berth_id: &str, window: &TimeWindow) -> Option<&Booking> {
        // The booking with the latest start before `window.end` is the only one that can
        // overlap, since earlier ones end before it starts.
        self.berths
            .get(berth_id)?
            .range(..window.end)
            .next_back()
            .map(|(_, booking)| booking)
            .filter(|booking| booking.window.overlaps(window))
    }

    pub fn is_free(&self, berth_id: &str, window: &TimeWindow) -> bool {
        self.conflict(berth_id, window).is_none()
    }

    pub fn book(
        &mut self,
        berth_id: &str,
        window: TimeWindow,
        request_id: &str,
    ) -> DispatchResult<()> {
        if window.is_empty() {
            return Err(DispatchError::Internal(format!(
                "空预订时间窗: {} - {}",
                window.start, window.end
            )));
        }
        if let Some(existing) = self.conflict(berth_id, &window) {
            return Err(DispatchError::BerthConflict {
                slot_id: berth_id.to_string(),
                holder: Some(existing.request_id.clone()),
            });
        }
        self.berths.entry(berth_id.to_string()).or_default().insert(
            window.start,
            Booking {
                window,
                request_id: request_id.to_string(),
            },
        );
        Ok(())
    }

    /// Remove a request's booking on a berth; false when there was none
    pub fn cancel(&mut self, berth_id: &str, request_id: &str) -> bool {
        let Some(bookings) = self.berths.get_mut(berth_id) else {
            return false;
        };
        let key = bookings
            .iter()
            .find(|(_, booking)| booking.request_id == request_id)
            .map(|(start, _)| *start);
        match key {
            Some(start) => bookings.remove(&start).is_some(),
            None => false,
        }
    }

    /// Drop every booking that ended at or before `now`. Returns how many were removed.
    pub fn prune_ended(&mut self, now: DateTime<Utc>) -> usize {
        let mut removed = 0;
        for bookings in self.berths.values_mut() {
            let before = bookings.len();
            bookings.retain(|_, booking| booking.window.end > now);
            removed += before - bookings.len();
        }
        self.berths.retain(|_, bookings| !bookings.is_empty());
        if removed > 0 {
            debug!(removed = removed, "清理已结束的泊位预订");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.berths.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn bookings(&self, berth_id: &str) -> Vec<Booking> {
        self.berths
            .get(berth_id)
            .map(|bookings| bookings.values().cloned().collect())
            .unwrap_or_default()
    }
}
