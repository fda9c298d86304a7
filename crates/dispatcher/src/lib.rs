//! 调度核心
//!
//! 限流、优先队列、准入控制、航线优化、泊位调度与对外的调度控制器。

pub mod admission;
pub mod berth_registry;
pub mod berth_scheduler;
pub mod controller;
pub mod priority_queue;
pub mod rate_limiter;
pub mod reservation_sweeper;
pub mod route_optimizer;

pub use admission::{
    adaptive_threshold, estimate_wait_time, queue_health, should_shed, AdmissionController,
    AdmissionDecision, QueueHealth,
};
pub use berth_registry::{BerthRegistry, ExpiredReservation};
pub use berth_scheduler::{plan_window, Booking, BookingCalendar, RollingWindowScheduler};
pub use controller::{DispatchController, RecoverySnapshot};
pub use priority_queue::PriorityQueue;
pub use rate_limiter::{BurstOutcome, RateLimiterRegistry, TokenBucket};
pub use reservation_sweeper::ReservationSweeper;
pub use route_optimizer::{
    channel_score, choose_route, estimate_route_cost, plan_multi_leg, RouteOptimizer,
};
