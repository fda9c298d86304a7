//! Observability module
//!
//! Structured logging helpers, the metrics collector and subscriber/exporter setup.

pub mod metrics_collector;
pub mod structured_logger;
pub mod telemetry_setup;

pub use metrics_collector::MetricsCollector;
pub use structured_logger::StructuredLogger;
pub use telemetry_setup::{init_logging, init_metrics, LogFormat};
