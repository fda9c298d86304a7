//! Metrics collector for the dispatch core
//!
//! Unlabelled series are registered once; labelled series are resolved per call.

use anyhow::Result;
use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};

/// Metrics collector for the dispatch core
pub struct MetricsCollector {
    admissions_total: Counter,
    allocations_total: Counter,
    queue_depth: Gauge,
    scheduling_duration: Histogram,
    checkpoint_global: Gauge,
}

impl MetricsCollector {
    pub fn new() -> Result<Self> {
        Ok(Self {
            admissions_total: counter!("harbor_admissions_total"),
            allocations_total: counter!("harbor_allocations_total"),
            queue_depth: gauge!("harbor_queue_depth"),
            scheduling_duration: histogram!("harbor_scheduling_duration_seconds"),
            checkpoint_global: gauge!("harbor_checkpoint_global_sequence"),
        })
    }

    pub fn record_admission(&self) {
        self.admissions_total.increment(1);
    }

    pub fn record_shed(&self, reason_code: &'static str) {
        counter!("harbor_sheds_total", "reason" => reason_code).increment(1);
    }

    pub fn update_queue_depth(&self, depth: usize) {
        self.queue_depth.set(depth as f64);
    }

    pub fn record_allocation(&self, berth_id: &str) {
        self.allocations_total.increment(1);
        counter!("harbor_berth_allocations_total", "berth" => berth_id.to_string()).increment(1);
    }

    pub fn record_breaker_transition(&self, service_id: &str, to: &'static str) {
        counter!(
            "harbor_breaker_transitions_total",
            "service" => service_id.to_string(),
            "to" => to
        )
        .increment(1);
    }

    pub fn update_checkpoint(&self, stream_id: &str, sequence: u64) {
        gauge!("harbor_checkpoint_sequence", "stream" => stream_id.to_string())
            .set(sequence as f64);
    }

    pub fn update_global_checkpoint(&self, sequence: u64) {
        self.checkpoint_global.set(sequence as f64);
    }

    /// Record scheduling pass duration
    pub fn record_scheduling_duration(&self, duration_seconds: f64) {
        self.scheduling_duration.record(duration_seconds);
    }
}
