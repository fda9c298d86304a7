pub mod admission;
pub mod app_config;
pub mod observability;
pub mod port;
pub mod resilience;
pub mod scheduling;

// Re-export main types for easier imports
pub use admission::{AdmissionConfig, RateLimiterConfig};
pub use app_config::AppConfig;
pub use observability::ObservabilityConfig;
pub use port::{BerthConfig, PortConfig};
pub use resilience::{ResilienceConfig, CAPACITY_SERVICE, ROUTE_SERVICE};
pub use scheduling::{CheckpointConfig, RoutingConfig, SchedulingConfig};
