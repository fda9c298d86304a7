//! 港口调度协调核心的基础类型：错误、时钟、领域模型、熔断器、下游接口与配置。

pub mod circuit_breaker;
pub mod clock;
pub mod config;
pub mod errors;
pub mod models;
pub mod traits;

pub use circuit_breaker::{
    BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AppConfig;
pub use errors::*;
pub use models::*;
pub use traits::{CapacityService, RouteService};
