//! Structured logging utilities
//!
//! Event-specific helpers so every component logs the same fields for the same event.

use harbor_core::{Allocation, CircuitState, DispatchError, RejectReason};
use tracing::{debug, error, info, warn};

/// Structured logging utilities
pub struct StructuredLogger;

impl StructuredLogger {
    /// Log an accepted dispatch request
    pub fn log_admission(request_id: &str, caller_id: &str, queue_depth: usize) {
        info!(
            event = "request_admitted",
            request.id = request_id,
            caller.id = caller_id,
            queue.depth = queue_depth,
            "Dispatch request admitted"
        );
    }

    /// Log a rejected (shed or rate limited) dispatch request
    pub fn log_shed(request_id: &str, caller_id: &str, reason: &RejectReason, queue_depth: usize) {
        warn!(
            event = "request_shed",
            request.id = request_id,
            caller.id = caller_id,
            reject.code = reason.code(),
            reject.reason = %reason,
            queue.depth = queue_depth,
            "Dispatch request rejected"
        );
    }

    /// Log a committed berth allocation
    pub fn log_allocation(allocation: &Allocation) {
        info!(
            event = "berth_allocated",
            allocation.id = %allocation.allocation_id,
            request.id = %allocation.request_id,
            vessel.id = %allocation.vessel_id,
            berth.id = %allocation.berth_id,
            channel.id = %allocation.channel_id,
            route.cost = allocation.route_cost,
            window.start = %allocation.window.start,
            window.end = %allocation.window.end,
            "Berth allocated"
        );
    }

    /// Log a circuit breaker state change
    pub fn log_breaker_transition(service_id: &str, from: CircuitState, to: CircuitState) {
        match to {
            CircuitState::Open => warn!(
                event = "breaker_transition",
                service.id = service_id,
                breaker.from = ?from,
                breaker.to = ?to,
                "Circuit breaker opened"
            ),
            _ => info!(
                event = "breaker_transition",
                service.id = service_id,
                breaker.from = ?from,
                breaker.to = ?to,
                "Circuit breaker state changed"
            ),
        }
    }

    /// Log checkpoint progress
    pub fn log_checkpoint(stream_id: &str, sequence: u64, global: bool) {
        debug!(
            event = "checkpoint",
            stream.id = stream_id,
            checkpoint.sequence = sequence,
            checkpoint.global = global,
            "Checkpoint recorded"
        );
    }

    /// Log a system error with the component and operation it came from
    pub fn log_system_error(component: &str, operation: &str, err: &DispatchError) {
        if err.is_fatal() {
            error!(
                event = "system_error",
                error.component = component,
                error.operation = operation,
                error.fatal = true,
                error.message = %err,
                "Fatal dispatch error"
            );
        } else {
            warn!(
                event = "system_error",
                error.component = component,
                error.operation = operation,
                error.fatal = false,
                error.retryable = err.is_retryable(),
                error.message = %err,
                "Dispatch operation failed"
            );
        }
    }
}
