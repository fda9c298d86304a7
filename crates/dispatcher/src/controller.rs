//! 调度控制器
//!
//! 对外的唯一入口：准入、批量泊位分配、航线选择、检查点与回放。
//! 控制器拥有所有共享集合（队列、泊位注册表、预订表、熔断器注册表、事件日志、检查点），
//! 不存在全局单例。

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::Duration;
use harbor_core::config::{CAPACITY_SERVICE, ROUTE_SERVICE};
use harbor_core::{
    Allocation, AppConfig, BreakerSnapshot, CapacityService, Channel, CheckpointRecord, Clock,
    DispatchError, DispatchRequest, DispatchResult, QueueEntry, ReplayedEvent, RouteService,
    TimeWindow,
};
use harbor_infrastructure::{
    verify_convergence, CheckpointManager, CircuitBreakerMiddleware, CircuitBreakerRegistry,
    EventJournal, GuardedCapacityService, GuardedRouteService, MetricsCollector, RecordOutcome,
    ReplayEngine, StructuredLogger, ALLOCATION_STREAM, ROUTE_STREAM,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::admission::{AdmissionController, AdmissionDecision, QueueHealth};
use crate::berth_registry::BerthRegistry;
use crate::berth_scheduler::{plan_window, BookingCalendar, RollingWindowScheduler};
use crate::priority_queue::PriorityQueue;
use crate::rate_limiter::RateLimiterRegistry;
use crate::reservation_sweeper::{reclaim_expired, ReservationSweeper};
use crate::route_optimizer::RouteOptimizer;

/// Persisted recovery state: stream checkpoints plus breaker snapshots
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecoverySnapshot {
    pub checkpoints: CheckpointRecord,
    pub last_global: u64,
    pub breakers: BTreeMap<String, BreakerSnapshot>,
}

pub struct DispatchController {
    config: AppConfig,
    clock: Arc<dyn Clock>,
    queue: Mutex<PriorityQueue<DispatchRequest>>,
    admission: AdmissionController,
    routes: RouteOptimizer,
    berths: Arc<BerthRegistry>,
    calendar: Arc<Mutex<BookingCalendar>>,
    window_scheduler: Mutex<RollingWindowScheduler>,
    capacity_service: Arc<dyn CapacityService>,
    route_service: Arc<dyn RouteService>,
    breakers: Arc<CircuitBreakerRegistry>,
    journal: EventJournal,
    checkpoints: CheckpointManager,
    replay_engine: ReplayEngine,
    metrics: Option<Arc<MetricsCollector>>,
}

impl DispatchController {
    /// Build a controller from validated configuration. The downstream services are wrapped
    /// in their configured circuit breakers.
    pub async fn new(
        config: AppConfig,
        clock: Arc<dyn Clock>,
        capacity_service: Arc<dyn CapacityService>,
        route_service: Arc<dyn RouteService>,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> DispatchResult<Self> {
        config.validate()?;

        let rate_limiter = Arc::new(RateLimiterRegistry::new(
            config.rate_limiter.clone(),
            clock.clone(),
        )?);
        let admission = AdmissionController::new(config.admission.clone(), rate_limiter)?;
        let routes = RouteOptimizer::new(config.port.channels.clone(), config.routing.clone());
        let berths = Arc::new(BerthRegistry::from_config(&config.port)?);
        let window_scheduler = RollingWindowScheduler::new(
            Duration::minutes(config.scheduling.window_minutes),
            config.scheduling.max_per_window,
        )?;

        let breakers =
            Arc::new(CircuitBreakerRegistry::from_config(&config.resilience, clock.clone()).await?);
        let capacity_service: Arc<dyn CapacityService> = Arc::new(GuardedCapacityService::new(
            capacity_service,
            Self::middleware(&breakers, CAPACITY_SERVICE, &metrics).await,
        ));
        let route_service: Arc<dyn RouteService> = Arc::new(GuardedRouteService::new(
            route_service,
            Self::middleware(&breakers, ROUTE_SERVICE, &metrics).await,
        ));

        let checkpoints = CheckpointManager::new(config.checkpoint.interval)?;
        let replay_engine = ReplayEngine::new(config.checkpoint.replay_window_size)?;
        let journal = EventJournal::new(clock.clone());

        info!(
            port = %config.port.name,
            berths = berths.len(),
            channels = config.port.channels.len(),
            "调度控制器初始化完成"
        );

        Ok(Self {
            config,
            clock,
            queue: Mutex::new(PriorityQueue::new()),
            admission,
            routes,
            berths,
            calendar: Arc::new(Mutex::new(BookingCalendar::new())),
            window_scheduler: Mutex::new(window_scheduler),
            capacity_service,
            route_service,
            breakers,
            journal,
            checkpoints,
            replay_engine,
            metrics,
        })
    }

    async fn middleware(
        breakers: &CircuitBreakerRegistry,
        service_id: &str,
        metrics: &Option<Arc<MetricsCollector>>,
    ) -> CircuitBreakerMiddleware {
        let middleware = CircuitBreakerMiddleware::new(breakers.get_or_create(service_id).await);
        match metrics {
            Some(metrics) => middleware.with_metrics(metrics.clone()),
            None => middleware,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn berths(&self) -> &Arc<BerthRegistry> {
        &self.berths
    }

    pub fn routes(&self) -> &RouteOptimizer {
        &self.routes
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    pub fn journal(&self) -> &EventJournal {
        &self.journal
    }

    pub fn checkpoints(&self) -> &CheckpointManager {
        &self.checkpoints
    }

    pub async fn queue_depth(&self) -> usize {
        self.queue.lock().await.size()
    }

    pub async fn queue_health(&self) -> QueueHealth {
        let depth = self.queue_depth().await;
        self.admission.health(depth)
    }

    /// Estimated seconds until the current queue is worked off
    pub async fn estimated_wait(&self) -> f64 {
        let depth = self.queue_depth().await;
        self.admission.estimate_wait(depth)
    }

    pub async fn booking_calendar(&self) -> BookingCalendar {
        self.calendar.lock().await.clone()
    }

    /// Admission check and enqueue as one step under the queue lock
    pub async fn admit(&self, request: DispatchRequest) -> AdmissionDecision {
        let mut queue = self.queue.lock().await;
        let depth = queue.size();
        let decision = self.admission.admit(&request, depth).await;

        match &decision {
            AdmissionDecision::Accepted => {
                StructuredLogger::log_admission(&request.id, &request.caller_id, depth);
                let priority = request.urgency;
                queue.enqueue(request, priority);
                if let Some(metrics) = &self.metrics {
                    metrics.record_admission();
                    metrics.update_queue_depth(queue.size());
                }
            }
            AdmissionDecision::Rejected { reason } => {
                StructuredLogger::log_shed(&request.id, &request.caller_id, reason, depth);
                if let Some(metrics) = &self.metrics {
                    metrics.record_shed(reason.code());
                }
            }
        }
        decision
    }

    /// Drain up to `capacity` of the most urgent queued requests into berth allocations.
    ///
    /// The tide level is read first: an open capacity breaker fails the pass before the queue
    /// is touched. Requests that cannot be placed go back into the queue at their original
    /// position.
    pub async fn schedule_next(&self, capacity: usize) -> DispatchResult<Vec<Allocation>> {
        let span = info_span!("schedule_next", capacity = capacity);
        self.schedule_pass(capacity).instrument(span).await
    }

    async fn schedule_pass(&self, capacity: usize) -> DispatchResult<Vec<Allocation>> {
        let started = Instant::now();
        let now = self.clock.now();
        let tide_level = self.capacity_service.tide_level(now).await?;

        let batch: Vec<QueueEntry<DispatchRequest>> = {
            let mut queue = self.queue.lock().await;
            let snapshot: Vec<DispatchRequest> = queue.iter().cloned().collect();
            let planned = plan_window(&snapshot, capacity);
            let selected: HashSet<String> = planned.iter().map(|r| r.id.clone()).collect();
            let mut drained = queue.drain_entries_while(|request| selected.contains(&request.id));

            let mut batch = Vec::with_capacity(planned.len());
            for request in &planned {
                if let Some(position) = drained.iter().position(|e| e.item.id == request.id) {
                    batch.push(drained.remove(position));
                }
            }
            // duplicates of a planned id that did not make the batch
            for entry in drained {
                queue.requeue(entry);
            }
            batch
        };
        debug!(batch = batch.len(), tide_level = tide_level, "本轮待分配请求");

        let mut allocations = Vec::with_capacity(batch.len());
        let mut deferred = Vec::new();
        let mut fatal = None;
        let mut pending = batch.into_iter();

        for entry in pending.by_ref() {
            match self.allocate(&entry.item, tide_level).await {
                Ok(allocation) => {
                    StructuredLogger::log_allocation(&allocation);
                    if let Some(metrics) = &self.metrics {
                        metrics.record_allocation(&allocation.berth_id);
                    }
                    allocations.push(allocation);
                }
                Err(e) => {
                    StructuredLogger::log_system_error("berth_scheduler", "allocate", &e);
                    let stop = matches!(e, DispatchError::CircuitOpen { .. }) || e.is_fatal();
                    deferred.push(entry);
                    if stop {
                        fatal = Some(e);
                        break;
                    }
                }
            }
        }
        deferred.extend(pending);

        if !deferred.is_empty() {
            let mut queue = self.queue.lock().await;
            for entry in deferred {
                queue.requeue(entry);
            }
            if let Some(metrics) = &self.metrics {
                metrics.update_queue_depth(queue.size());
            }
        }

        if !allocations.is_empty() {
            self.checkpoint(ALLOCATION_STREAM).await?;
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_scheduling_duration(started.elapsed().as_secs_f64());
        }

        // allocations already committed stay committed; the error is reported only when
        // nothing was placed
        match fatal {
            Some(e) if allocations.is_empty() => Err(e),
            Some(e) => {
                warn!(error = %e, allocated = allocations.len(), "调度中途停止");
                Ok(allocations)
            }
            None => {
                info!(allocated = allocations.len(), "调度轮次完成");
                Ok(allocations)
            }
        }
    }

    async fn allocate(
        &self,
        request: &DispatchRequest,
        tide_level: f64,
    ) -> DispatchResult<Allocation> {
        let now = self.clock.now();
        self.window_scheduler.lock().await.schedule(now)?;

        match self.place(request, tide_level).await {
            Ok(allocation) => Ok(allocation),
            Err(e) => {
                self.window_scheduler.lock().await.unschedule(now);
                Err(e)
            }
        }
    }

    async fn place(
        &self,
        request: &DispatchRequest,
        tide_level: f64,
    ) -> DispatchResult<Allocation> {
        let now = self.clock.now();
        let candidates = self.route_service.candidate_channels(request).await?;
        let channel = self.routes.choose(&candidates).await?;
        let route_cost = self.routes.estimate_cost(&channel);

        let start = request.eta.max(now);
        let window = TimeWindow::new(
            start,
            start + Duration::minutes(self.config.scheduling.berth_occupancy_minutes),
        );
        let reserved_until =
            now + Duration::seconds(self.config.scheduling.reservation_ttl_seconds);

        let berth_id = {
            let mut calendar = self.calendar.lock().await;
            // expired holders lose their booking before their slot can be reused
            reclaim_expired(&self.berths, &mut calendar, now);
            let berth_id = self.berths.reserve_first_fit(
                &request.cargo,
                tide_level,
                request.vessel_id(),
                reserved_until,
                now,
                |slot_id| calendar.is_free(slot_id, &window),
            )?;
            if let Err(e) = calendar.book(&berth_id, window, &request.id) {
                self.berths.release(&berth_id, request.vessel_id())?;
                return Err(e);
            }
            berth_id
        };

        let allocation = Allocation {
            allocation_id: Uuid::new_v4().to_string(),
            request_id: request.id.clone(),
            vessel_id: request.vessel_id().to_string(),
            berth_id,
            channel_id: channel.id,
            route_cost,
            window,
            allocated_at: now,
        };
        let payload = serde_json::to_value(&allocation)?;
        self.journal
            .append(ALLOCATION_STREAM, allocation.allocation_id.clone(), payload)
            .await;
        Ok(allocation)
    }

    /// Pick the lowest-latency candidate outside both the caller's and the runtime blocked set
    pub async fn select_route(
        &self,
        candidates: &[Channel],
        blocked: &HashSet<String>,
    ) -> DispatchResult<Channel> {
        let remaining: Vec<Channel> = candidates
            .iter()
            .filter(|channel| !blocked.contains(&channel.id))
            .cloned()
            .collect();
        let channel = self.routes.choose(&remaining).await?;

        let payload = serde_json::json!({
            "channel_id": channel.id,
            "latency": channel.latency,
            "candidates": candidates.len(),
        });
        self.journal
            .append(ROUTE_STREAM, Uuid::new_v4().to_string(), payload)
            .await;
        Ok(channel)
    }

    /// Commit the stream's latest journal sequence and return the stored checkpoint
    pub async fn checkpoint(&self, stream_id: &str) -> DispatchResult<u64> {
        let sequence = self.journal.last_sequence(stream_id).await;
        let outcome = self.checkpoints.record(stream_id, sequence).await;
        if let RecordOutcome::Advanced { .. } = outcome {
            StructuredLogger::log_checkpoint(stream_id, sequence, false);
            if let Some(metrics) = &self.metrics {
                metrics.update_checkpoint(stream_id, sequence);
            }
            let retention = self.config.checkpoint.journal_retention;
            self.journal
                .compact(stream_id, sequence.saturating_sub(retention))
                .await;
        }

        let total = self.journal.total_events().await;
        if self.checkpoints.should_checkpoint(total).await {
            self.checkpoints.mark_checkpointed(total).await;
            StructuredLogger::log_checkpoint("global", total, true);
            if let Some(metrics) = &self.metrics {
                metrics.update_global_checkpoint(total);
            }
        }

        self.checkpoints.get(stream_id).await.ok_or_else(|| {
            DispatchError::Internal(format!("检查点写入后丢失: {stream_id}"))
        })
    }

    pub fn replay(&self, events: &[ReplayedEvent]) -> Vec<ReplayedEvent> {
        self.replay_engine.replay(events)
    }

    pub fn replay_windowed(&self, events: &[ReplayedEvent]) -> DispatchResult<Vec<ReplayedEvent>> {
        self.replay_engine.replay_windowed(events)
    }

    /// Replays two event sets and fails with `ReplayDivergence` when they disagree
    pub fn verify_replay(
        &self,
        left: &[ReplayedEvent],
        right: &[ReplayedEvent],
    ) -> DispatchResult<Vec<ReplayedEvent>> {
        verify_convergence(left, right)
    }

    /// Vessel arrived at its reserved berth
    pub async fn confirm_arrival(&self, allocation: &Allocation) -> DispatchResult<()> {
        self.berths
            .occupy(&allocation.berth_id, &allocation.vessel_id, self.clock.now())
    }

    /// Vessel left: free the berth and its booking
    pub async fn depart(&self, allocation: &Allocation) -> DispatchResult<()> {
        self.berths
            .release(&allocation.berth_id, &allocation.vessel_id)?;
        self.calendar
            .lock()
            .await
            .cancel(&allocation.berth_id, &allocation.request_id);
        Ok(())
    }

    pub async fn recovery_snapshot(&self) -> RecoverySnapshot {
        RecoverySnapshot {
            checkpoints: self.checkpoints.snapshot().await,
            last_global: self.checkpoints.last_global().await,
            breakers: self.breakers.snapshot_all().await,
        }
    }

    pub async fn restore(&self, snapshot: &RecoverySnapshot) -> DispatchResult<()> {
        self.checkpoints.restore(&snapshot.checkpoints).await;
        self.checkpoints.mark_checkpointed(snapshot.last_global).await;
        self.breakers.restore_all(&snapshot.breakers).await?;
        info!(
            streams = snapshot.checkpoints.len(),
            breakers = snapshot.breakers.len(),
            "恢复状态已加载"
        );
        Ok(())
    }

    /// Sweeper sharing this controller's berth registry and booking calendar
    pub fn reservation_sweeper(&self) -> ReservationSweeper {
        ReservationSweeper::new(
            self.berths.clone(),
            self.calendar.clone(),
            self.clock.clone(),
            std::time::Duration::from_secs(self.config.scheduling.sweep_interval_seconds),
        )
        .with_rate_limiter(self.admission.rate_limiter().clone())
    }
}
