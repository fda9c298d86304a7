pub mod circuit_breaker;
pub mod circuit_breaker_wrapper;
pub mod event_journal;
pub mod observability;
pub mod port_services;
pub mod recovery;

pub use circuit_breaker::{CircuitBreakerMiddleware, CircuitBreakerRegistry};
pub use circuit_breaker_wrapper::{GuardedCapacityService, GuardedRouteService};
pub use event_journal::{EventJournal, JournalEntry, ALLOCATION_STREAM, ROUTE_STREAM};
pub use observability::*;
pub use port_services::{StaticRouteCatalog, StaticTideService};
pub use recovery::*;
