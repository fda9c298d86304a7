//! Test data builders for creating test entities
//!
//! This module provides builder patterns for creating test data with
//! sensible defaults and easy customization.

use chrono::{DateTime, Duration, Utc};
use harbor_core::{BerthSlot, BerthState, CargoProfile, Channel, DispatchRequest};

use crate::helpers::test_epoch;

/// Builder for creating test DispatchRequest entities
pub struct DispatchRequestBuilder {
    request: DispatchRequest,
}

impl DispatchRequestBuilder {
    pub fn new() -> Self {
        let epoch = test_epoch();
        Self {
            request: DispatchRequest {
                id: "req-1".to_string(),
                caller_id: "caller-1".to_string(),
                urgency: 10.0,
                eta: epoch + Duration::hours(1),
                cargo: CargoProfile {
                    draft: 8.0,
                    length: 150.0,
                    tonnage: 20_000.0,
                },
                submitted_at: epoch,
            },
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.request.id = id.to_string();
        self
    }

    pub fn with_caller(mut self, caller_id: &str) -> Self {
        self.request.caller_id = caller_id.to_string();
        self
    }

    pub fn with_urgency(mut self, urgency: f64) -> Self {
        self.request.urgency = urgency;
        self
    }

    pub fn with_eta(mut self, eta: DateTime<Utc>) -> Self {
        self.request.eta = eta;
        self
    }

    pub fn with_draft(mut self, draft: f64) -> Self {
        self.request.cargo.draft = draft;
        self
    }

    pub fn with_length(mut self, length: f64) -> Self {
        self.request.cargo.length = length;
        self
    }

    pub fn with_tonnage(mut self, tonnage: f64) -> Self {
        self.request.cargo.tonnage = tonnage;
        self
    }

    pub fn with_submitted_at(mut self, submitted_at: DateTime<Utc>) -> Self {
        self.request.submitted_at = submitted_at;
        self
    }

    pub fn build(self) -> DispatchRequest {
        self.request
    }
}

impl Default for DispatchRequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating test BerthSlot entities
pub struct BerthSlotBuilder {
    slot: BerthSlot,
}

impl BerthSlotBuilder {
    pub fn new() -> Self {
        Self {
            slot: BerthSlot::new("B1", 12.0, 250.0),
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.slot.id = id.to_string();
        self
    }

    pub fn with_max_draft(mut self, max_draft: f64) -> Self {
        self.slot.max_draft = max_draft;
        self
    }

    pub fn with_max_length(mut self, max_length: f64) -> Self {
        self.slot.max_length = max_length;
        self
    }

    pub fn reserved_by(mut self, vessel_id: &str, until: DateTime<Utc>) -> Self {
        self.slot.state = BerthState::Reserved;
        self.slot.assigned_vessel = Some(vessel_id.to_string());
        self.slot.reserved_until = Some(until);
        self
    }

    pub fn in_maintenance(mut self) -> Self {
        self.slot.state = BerthState::Maintenance;
        self
    }

    pub fn build(self) -> BerthSlot {
        self.slot
    }
}

impl Default for BerthSlotBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating test Channel entities
pub struct ChannelBuilder {
    channel: Channel,
}

impl ChannelBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            channel: Channel::new(id, 10.0),
        }
    }

    pub fn with_latency(mut self, latency: f64) -> Self {
        self.channel.latency = latency;
        self
    }

    pub fn with_reliability(mut self, reliability: f64) -> Self {
        self.channel.reliability = reliability;
        self
    }

    pub fn blocked(mut self) -> Self {
        self.channel.blocked = true;
        self
    }

    pub fn build(self) -> Channel {
        self.channel
    }
}

/// Shorthand for a batch of requests with the given urgencies, ids `req-0..`
pub fn requests_with_urgencies(urgencies: &[f64]) -> Vec<DispatchRequest> {
    urgencies
        .iter()
        .enumerate()
        .map(|(i, urgency)| {
            DispatchRequestBuilder::new()
                .with_id(&format!("req-{i}"))
                .with_urgency(*urgency)
                .build()
        })
        .collect()
}
