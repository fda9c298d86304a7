use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use harbor_core::{AppConfig, Clock, ReplayedEvent, SystemClock};
use harbor_dispatcher::DispatchController;
use harbor_infrastructure::{
    init_metrics, replay_with_windowing, MetricsCollector, StaticRouteCatalog, StaticTideService,
};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::scenario::{AdmissionRecord, PlanReport, Scenario};

/// 主应用程序
///
/// 持有调度控制器及其下游服务；`run` 驱动调度循环和预留回收，`plan`/`replay` 为一次性命令。
pub struct Application {
    config: AppConfig,
    controller: Arc<DispatchController>,
}

impl Application {
    pub async fn new(config: AppConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock)).await
    }

    pub async fn with_clock(config: AppConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        info!(port = %config.port.name, "初始化应用程序");

        let metrics = if config.observability.metrics_enabled {
            init_metrics(&config.observability.metrics_listen)?;
            Some(Arc::new(MetricsCollector::new().context("创建指标收集器失败")?))
        } else {
            None
        };

        let controller = DispatchController::new(
            config.clone(),
            clock,
            Arc::new(StaticTideService::from_config(&config.port)),
            Arc::new(StaticRouteCatalog::from_config(&config.port)),
            metrics,
        )
        .await
        .context("创建调度控制器失败")?;

        Ok(Self {
            config,
            controller: Arc::new(controller),
        })
    }

    pub fn controller(&self) -> &Arc<DispatchController> {
        &self.controller
    }

    /// Scheduling loop plus reservation sweeper until the shutdown signal
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!("启动调度服务");

        let sweeper = Arc::new(self.controller.reservation_sweeper());
        let sweeper_handle = {
            let sweeper = Arc::clone(&sweeper);
            tokio::spawn(async move { sweeper.start().await })
        };

        let scheduler_handle = {
            let controller = Arc::clone(&self.controller);
            let interval = self.config.scheduling.schedule_interval_seconds;
            let capacity = self.config.scheduling.default_batch_capacity;
            let shutdown_rx = shutdown_rx.resubscribe();

            tokio::spawn(async move {
                run_scheduler_loop(controller, interval, capacity, shutdown_rx).await;
            })
        };

        let _ = shutdown_rx.recv().await;
        info!("调度服务收到关闭信号");

        sweeper.stop().await;
        let (scheduler_result, sweeper_result) = tokio::join!(scheduler_handle, sweeper_handle);
        if let Err(e) = scheduler_result {
            error!("调度循环异常退出: {e}");
        }
        if let Err(e) = sweeper_result {
            error!("预留回收循环异常退出: {e}");
        }

        let snapshot = self.controller.recovery_snapshot().await;
        info!(
            streams = snapshot.checkpoints.len(),
            last_global = snapshot.last_global,
            "调度服务已停止"
        );
        Ok(())
    }

    /// Admit every scenario request, then run one scheduling pass
    pub async fn plan(&self, scenario: Scenario) -> Result<PlanReport> {
        let mut admissions = Vec::with_capacity(scenario.requests.len());
        for request in scenario.requests {
            let request_id = request.id.clone();
            let decision = self.controller.admit(request).await;
            admissions.push(AdmissionRecord {
                request_id,
                decision,
            });
        }

        let capacity = scenario
            .capacity
            .unwrap_or(self.config.scheduling.default_batch_capacity);
        let allocations = self
            .controller
            .schedule_next(capacity)
            .await
            .context("调度失败")?;

        Ok(PlanReport {
            admissions,
            allocations,
            queued: self.controller.queue_depth().await,
        })
    }

    pub fn replay(
        &self,
        events: &[ReplayedEvent],
        window: Option<usize>,
    ) -> Result<Vec<ReplayedEvent>> {
        match window {
            Some(window) => replay_with_windowing(events, window).context("分窗回放失败"),
            None => Ok(self.controller.replay(events)),
        }
    }
}

async fn run_scheduler_loop(
    controller: Arc<DispatchController>,
    interval_seconds: u64,
    capacity: usize,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_seconds));

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match controller.schedule_next(capacity).await {
                    Ok(allocations) if !allocations.is_empty() => {
                        info!(allocated = allocations.len(), "本轮分配完成");
                    }
                    Ok(_) => {}
                    Err(e) if e.is_retryable() => warn!("调度暂缓: {e}"),
                    Err(e) => error!("调度失败: {e}"),
                }
            }
            _ = shutdown_rx.recv() => {
                info!("调度循环收到关闭信号");
                break;
            }
        }
    }
}
