//! Test helper utilities and common testing patterns

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use harbor_core::ManualClock;
use tokio::time::sleep;

/// Fixed instant all builders default to, on a window boundary
pub fn test_epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 6, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

/// Manual clock starting at `test_epoch()`
pub fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(test_epoch()))
}

/// Test environment setup utilities
pub struct TestEnv;

impl TestEnv {
    /// Wait for a condition to be true with timeout
    pub async fn wait_for<F, Fut>(mut condition: F, timeout: Duration) -> bool
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        let start = std::time::Instant::now();

        while start.elapsed() < timeout {
            if condition().await {
                return true;
            }
            sleep(Duration::from_millis(20)).await;
        }

        false
    }
}
