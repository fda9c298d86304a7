//! 下游服务接口定义
//!
//! 调度核心只在接口边界上依赖两个外部协作方：
//! - `CapacityService` - 提供某一时刻的潮位，用于泊位吃水校验
//! - `RouteService` - 为调度请求提供候选航道
//!
//! 所有实现都通过熔断器包装后再交给调度控制器使用，接口本身不关心重试与超时。

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::DispatchResult;
use crate::models::{Channel, DispatchRequest};

/// 港口容量服务
#[async_trait]
pub trait CapacityService: Send + Sync {
    /// Tide level (metres of extra draft headroom) at the given instant
    async fn tide_level(&self, at: DateTime<Utc>) -> DispatchResult<f64>;
}

/// 航道服务
#[async_trait]
pub trait RouteService: Send + Sync {
    /// Candidate channels for a request; an empty list means no route is known
    async fn candidate_channels(&self, request: &DispatchRequest) -> DispatchResult<Vec<Channel>>;
}
