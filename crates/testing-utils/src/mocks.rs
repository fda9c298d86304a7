//! Mock implementations of the downstream service traits

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use harbor_core::{
    CapacityService, Channel, DispatchError, DispatchRequest, DispatchResult, RouteService,
};

/// Mock implementation of CapacityService for testing
#[derive(Debug, Clone)]
pub struct MockCapacityService {
    tide_level: Arc<Mutex<f64>>,
    failing: Arc<AtomicBool>,
    delay: Arc<Mutex<Option<Duration>>>,
    calls: Arc<AtomicUsize>,
}

impl MockCapacityService {
    pub fn new(tide_level: f64) -> Self {
        Self {
            tide_level: Arc::new(Mutex::new(tide_level)),
            failing: Arc::new(AtomicBool::new(false)),
            delay: Arc::new(Mutex::new(None)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn set_tide_level(&self, tide_level: f64) {
        *self.tide_level.lock().unwrap() = tide_level;
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CapacityService for MockCapacityService {
    async fn tide_level(&self, _at: DateTime<Utc>) -> DispatchResult<f64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(DispatchError::Downstream("tide gauge unavailable".to_string()));
        }
        Ok(*self.tide_level.lock().unwrap())
    }
}

/// Mock implementation of RouteService for testing
#[derive(Debug, Clone)]
pub struct MockRouteService {
    default_channels: Arc<Mutex<Vec<Channel>>>,
    per_request: Arc<Mutex<HashMap<String, Vec<Channel>>>>,
    failing: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
}

impl MockRouteService {
    pub fn new(channels: Vec<Channel>) -> Self {
        Self {
            default_channels: Arc::new(Mutex::new(channels)),
            per_request: Arc::new(Mutex::new(HashMap::new())),
            failing: Arc::new(AtomicBool::new(false)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Override the candidates returned for one request id
    pub fn set_channels_for(&self, request_id: &str, channels: Vec<Channel>) {
        self.per_request
            .lock()
            .unwrap()
            .insert(request_id.to_string(), channels);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RouteService for MockRouteService {
    async fn candidate_channels(&self, request: &DispatchRequest) -> DispatchResult<Vec<Channel>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(DispatchError::Downstream("route service unavailable".to_string()));
        }
        if let Some(channels) = self.per_request.lock().unwrap().get(&request.id) {
            return Ok(channels.clone());
        }
        Ok(self.default_channels.lock().unwrap().clone())
    }
}
