pub mod berth;
pub mod event;
pub mod request;
pub mod route;

pub use berth::{Allocation, BerthSlot, BerthState, TimeWindow};
pub use event::{CheckpointRecord, ReplayedEvent};
pub use request::{CargoProfile, DispatchRequest, QueueEntry};
pub use route::{Channel, MultiLegPlan};
