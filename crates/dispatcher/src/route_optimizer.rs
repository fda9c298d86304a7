//! 航线优化
//!
//! 选择延迟最小的可用航道（平局按航道 id 升序），多航段规划逐段独立选择，
//! 任一航段无可用航道即整体失败并指明航段。

use std::cmp::Ordering;
use std::collections::HashSet;

use harbor_core::config::RoutingConfig;
use harbor_core::{Channel, DispatchError, DispatchResult, MultiLegPlan};
use tokio::sync::RwLock;
use tracing::{debug, info};

fn is_eligible(channel: &Channel, blocked: &HashSet<String>) -> bool {
    !channel.blocked
        && !blocked.contains(&channel.id)
        && channel.latency.is_finite()
        && channel.latency >= 0.0
}

fn by_latency_then_id(a: &Channel, b: &Channel) -> Ordering {
    a.latency
        .total_cmp(&b.latency)
        .then_with(|| a.id.cmp(&b.id))
}

/// Minimum-latency eligible channel; ties go to the lowest id
pub fn choose_route<'a>(routes: &'a [Channel], blocked: &HashSet<String>) -> Option<&'a Channel> {
    routes
        .iter()
        .filter(|channel| is_eligible(channel, blocked))
        .min_by(|a, b| by_latency_then_id(a, b))
}

/// One channel per leg plus the summed latency; the first leg without a candidate fails the plan
pub fn plan_multi_leg(
    legs: &[Vec<Channel>],
    blocked: &HashSet<String>,
) -> DispatchResult<MultiLegPlan> {
    let mut channels = Vec::with_capacity(legs.len());
    for (leg, candidates) in legs.iter().enumerate() {
        match choose_route(candidates, blocked) {
            Some(channel) => channels.push(channel.clone()),
            None => {
                return Err(DispatchError::no_route(
                    Some(leg),
                    format!("{} 个候选航道均不可用", candidates.len()),
                ));
            }
        }
    }
    let total_latency = channels.iter().map(|channel| channel.latency).sum();
    Ok(MultiLegPlan {
        channels,
        total_latency,
    })
}

/// Base cost plus the weighted latency penalty. Negative latency adds nothing.
pub fn estimate_route_cost(route: &Channel, base_cost_per_unit: f64, latency_weight: f64) -> f64 {
    base_cost_per_unit + route.latency.max(0.0) * latency_weight
}

/// `(reliability * priority) / latency`; channels without a positive finite latency score 0
pub fn channel_score(route: &Channel, reliability: f64, priority: f64) -> f64 {
    if !(route.latency > 0.0) || !route.latency.is_finite() {
        return 0.0;
    }
    (reliability * priority) / route.latency
}

/// 航道目录与运行期封闭集合
///
/// 封闭只记录 id，航道定义本身保持不变。
pub struct RouteOptimizer {
    catalog: Vec<Channel>,
    config: RoutingConfig,
    blocked: RwLock<HashSet<String>>,
}

impl RouteOptimizer {
    pub fn new(catalog: Vec<Channel>, config: RoutingConfig) -> Self {
        Self {
            catalog,
            config,
            blocked: RwLock::new(HashSet::new()),
        }
    }

    pub fn catalog(&self) -> &[Channel] {
        &self.catalog
    }

    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    /// Returns false when the channel was already blocked
    pub async fn block(&self, channel_id: &str) -> bool {
        let inserted = self.blocked.write().await.insert(channel_id.to_string());
        if inserted {
            info!(channel_id = channel_id, "航道已封闭");
        }
        inserted
    }

    pub async fn unblock(&self, channel_id: &str) -> bool {
        let removed = self.blocked.write().await.remove(channel_id);
        if removed {
            info!(channel_id = channel_id, "航道已解除封闭");
        }
        removed
    }

    pub async fn blocked(&self) -> HashSet<String> {
        self.blocked.read().await.clone()
    }

    /// Choose among `candidates` with the current blocked set applied
    pub async fn choose(&self, candidates: &[Channel]) -> DispatchResult<Channel> {
        let blocked = self.blocked.read().await;
        let chosen = choose_route(candidates, &blocked).cloned().ok_or_else(|| {
            DispatchError::no_route(
                None,
                format!("{} 个候选航道均不可用", candidates.len()),
            )
        })?;
        debug!(channel_id = %chosen.id, latency = chosen.latency, "选定航道");
        Ok(chosen)
    }

    pub async fn plan(&self, legs: &[Vec<Channel>]) -> DispatchResult<MultiLegPlan> {
        let blocked = self.blocked.read().await;
        plan_multi_leg(legs, &blocked)
    }

    pub fn estimate_cost(&self, channel: &Channel) -> f64 {
        estimate_route_cost(
            channel,
            self.config.base_cost_per_unit,
            self.config.latency_weight,
        )
    }

    /// Eligible catalog channels by score, best first; ties by id
    pub async fn rank_channels(&self, priority: f64) -> Vec<(Channel, f64)> {
        let blocked = self.blocked.read().await;
        let mut ranked: Vec<(Channel, f64)> = self
            .catalog
            .iter()
            .filter(|channel| is_eligible(channel, &blocked))
            .map(|channel| {
                let score = channel_score(channel, channel.reliability, priority);
                (channel.clone(), score)
            })
            .collect();
        ranked.sort_by(|(a, sa), (b, sb)| sb.total_cmp(sa).then_with(|| a.id.cmp(&b.id)));
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(id: &str, latency: f64) -> Channel {
        Channel::new(id, latency)
    }

    fn none() -> HashSet<String> {
        HashSet::new()
    }

    #[test]
    fn test_choose_route_minimum_latency() {
        let routes = vec![channel("a", 5.0), channel("b", 3.0)];
        assert_eq!(choose_route(&routes, &none()).unwrap().id, "b");
    }

    #[test]
    fn test_choose_route_tie_by_id() {
        let routes = vec![channel("delta", 4.0), channel("alpha", 4.0), channel("c", 9.0)];
        assert_eq!(choose_route(&routes, &none()).unwrap().id, "alpha");
    }

    #[test]
    fn test_choose_route_filters_blocked_and_negative() {
        let mut static_blocked = channel("s", 1.0);
        static_blocked.blocked = true;
        let routes = vec![
            channel("neg", -1.0),
            channel("x", 2.0),
            static_blocked,
            channel("y", 7.0),
        ];
        let blocked: HashSet<String> = ["x".to_string()].into_iter().collect();
        assert_eq!(choose_route(&routes, &blocked).unwrap().id, "y");
        assert!(choose_route(&routes[..1], &none()).is_none());
    }

    #[test]
    fn test_plan_multi_leg_sums_latency() {
        let legs = vec![
            vec![channel("a", 5.0), channel("b", 3.0)],
            vec![channel("c", 4.0)],
        ];
        let plan = plan_multi_leg(&legs, &none()).unwrap();
        let ids: Vec<_> = plan.channels.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
        assert_eq!(plan.total_latency, 7.0);
    }

    #[test]
    fn test_plan_multi_leg_names_failing_leg() {
        let legs = vec![vec![channel("a", 5.0)], vec![], vec![channel("c", 1.0)]];
        match plan_multi_leg(&legs, &none()) {
            Err(DispatchError::NoRouteAvailable { leg, .. }) => assert_eq!(leg, Some(1)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_route_cost_is_additive() {
        let route = channel("a", 4.0);
        assert_eq!(estimate_route_cost(&route, 100.0, 2.5), 110.0);
        assert_eq!(estimate_route_cost(&route, 100.0, 0.0), 100.0);
    }

    #[test]
    fn test_channel_score_is_multiplicative() {
        let reliable = channel("r", 10.0);
        let flaky = channel("f", 10.0);
        assert!((channel_score(&reliable, 0.9, 2.0) - 0.18).abs() < 1e-12);
        assert!(channel_score(&flaky, 0.1, 10.0) < channel_score(&reliable, 0.9, 2.0));
        assert_eq!(channel_score(&channel("z", 0.0), 1.0, 1.0), 0.0);
    }

    #[tokio::test]
    async fn test_block_keeps_catalog() {
        let optimizer = RouteOptimizer::new(
            vec![channel("a", 5.0), channel("b", 3.0)],
            RoutingConfig::default(),
        );
        assert!(optimizer.block("b").await);
        assert!(!optimizer.block("b").await);
        assert_eq!(optimizer.catalog().len(), 2);

        let chosen = optimizer.choose(optimizer.catalog()).await.unwrap();
        assert_eq!(chosen.id, "a");

        assert!(optimizer.unblock("b").await);
        let chosen = optimizer.choose(optimizer.catalog()).await.unwrap();
        assert_eq!(chosen.id, "b");
    }

    #[tokio::test]
    async fn test_rank_channels_by_score() {
        let optimizer = RouteOptimizer::new(
            vec![
                channel("slow", 20.0).with_reliability(1.0),
                channel("fast", 5.0).with_reliability(0.5),
                channel("mid", 10.0).with_reliability(1.0),
            ],
            RoutingConfig::default(),
        );
        let ranked: Vec<_> = optimizer
            .rank_channels(1.0)
            .await
            .into_iter()
            .map(|(c, _)| c.id)
            .collect();
        // fast: 0.1, mid: 0.1 (tie by id), slow: 0.05
        assert_eq!(ranked, vec!["fast", "mid", "slow"]);
    }
}
