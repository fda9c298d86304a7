use std::collections::HashSet;
use std::sync::Arc;

use chrono::Duration;
use harbor_core::{
    AppConfig, BerthState, CircuitState, Clock, DispatchError, ManualClock, RejectReason,
};
use harbor_dispatcher::{AdmissionDecision, DispatchController};
use harbor_infrastructure::ALLOCATION_STREAM;
use harbor_testing_utils::{
    manual_clock, ChannelBuilder, DispatchRequestBuilder, MockCapacityService, MockRouteService,
};

struct Harness {
    controller: DispatchController,
    clock: Arc<ManualClock>,
    capacity: MockCapacityService,
    routes: MockRouteService,
}

async fn harness(config: AppConfig) -> Harness {
    let clock = manual_clock();
    let capacity = MockCapacityService::new(1.5);
    let routes = MockRouteService::new(vec![
        ChannelBuilder::new("north").with_latency(42.0).build(),
        ChannelBuilder::new("south").with_latency(35.0).build(),
    ]);
    let controller = DispatchController::new(
        config,
        clock.clone(),
        Arc::new(capacity.clone()),
        Arc::new(routes.clone()),
        None,
    )
    .await
    .unwrap();
    Harness {
        controller,
        clock,
        capacity,
        routes,
    }
}

async fn admit_all(controller: &DispatchController, urgencies: &[f64]) {
    for (i, urgency) in urgencies.iter().enumerate() {
        let request = DispatchRequestBuilder::new()
            .with_id(&format!("req-{i}"))
            .with_urgency(*urgency)
            .build();
        assert!(controller.admit(request).await.is_accepted());
    }
}

#[tokio::test]
async fn test_schedule_next_allocates_most_urgent_first() {
    let h = harness(AppConfig::default()).await;
    admit_all(&h.controller, &[10.0, 50.0, 20.0]).await;
    assert_eq!(h.controller.queue_depth().await, 3);

    let allocations = h.controller.schedule_next(2).await.unwrap();
    let ids: Vec<_> = allocations.iter().map(|a| a.request_id.as_str()).collect();
    assert_eq!(ids, vec!["req-1", "req-2"]);
    assert_eq!(h.controller.queue_depth().await, 1);

    // first fit in configuration order, lowest latency channel
    assert_eq!(allocations[0].berth_id, "B1");
    assert_eq!(allocations[1].berth_id, "B2");
    assert!(allocations.iter().all(|a| a.channel_id == "south"));
    assert_eq!(h.controller.berths().get("B1").unwrap().state, BerthState::Reserved);

    assert_eq!(h.controller.journal().last_sequence(ALLOCATION_STREAM).await, 2);
    assert_eq!(h.controller.checkpoints().get(ALLOCATION_STREAM).await, Some(2));
    assert_eq!(h.capacity.call_count(), 1);
    assert_eq!(h.routes.call_count(), 2);
}

#[tokio::test]
async fn test_allocation_cost_is_additive() {
    let h = harness(AppConfig::default()).await;
    admit_all(&h.controller, &[5.0]).await;
    let allocations = h.controller.schedule_next(1).await.unwrap();
    let routing = &h.controller.config().routing;
    let expected = routing.base_cost_per_unit + 35.0 * routing.latency_weight;
    assert!((allocations[0].route_cost - expected).abs() < 1e-9);
}

#[tokio::test]
async fn test_hard_limit_sheds_at_limit() {
    let mut config = AppConfig::default();
    config.admission.hard_limit = 2;
    let h = harness(config).await;
    admit_all(&h.controller, &[1.0, 2.0]).await;

    let request = DispatchRequestBuilder::new().with_id("late").build();
    match h.controller.admit(request).await {
        AdmissionDecision::Rejected {
            reason: RejectReason::QueueFull { depth, limit },
        } => {
            assert_eq!(depth, 2);
            assert_eq!(limit, 2);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(h.controller.queue_depth().await, 2);
}

#[tokio::test]
async fn test_open_capacity_breaker_leaves_queue_untouched() {
    let mut config = AppConfig::default();
    config.resilience.capacity_service.failure_threshold = 1;
    let h = harness(config).await;
    admit_all(&h.controller, &[3.0, 4.0]).await;

    h.capacity.set_failing(true);
    assert!(matches!(
        h.controller.schedule_next(2).await,
        Err(DispatchError::Downstream(_))
    ));
    match h.controller.schedule_next(2).await {
        Err(DispatchError::CircuitOpen { service, retry_after }) => {
            assert_eq!(service, "capacity-service");
            assert!(retry_after.is_some());
        }
        other => panic!("unexpected {other:?}"),
    }

    // the open breaker short-circuits the second call
    assert_eq!(h.capacity.call_count(), 1);
    assert_eq!(h.controller.queue_depth().await, 2);
    assert_eq!(h.routes.call_count(), 0);
}

#[tokio::test]
async fn test_unplaceable_request_is_requeued() {
    let h = harness(AppConfig::default()).await;
    let deep = DispatchRequestBuilder::new()
        .with_id("deep")
        .with_draft(20.0)
        .with_urgency(99.0)
        .build();
    assert!(h.controller.admit(deep).await.is_accepted());

    let allocations = h.controller.schedule_next(4).await.unwrap();
    assert!(allocations.is_empty());
    assert_eq!(h.controller.queue_depth().await, 1);
}

#[tokio::test]
async fn test_requeued_request_keeps_its_place_among_equals() {
    let h = harness(AppConfig::default()).await;
    for id in ["first", "second"] {
        let request = DispatchRequestBuilder::new()
            .with_id(id)
            .with_urgency(5.0)
            .build();
        assert!(h.controller.admit(request).await.is_accepted());
    }

    h.routes.set_channels_for("first", vec![]);
    assert!(h.controller.schedule_next(1).await.unwrap().is_empty());
    assert_eq!(h.controller.queue_depth().await, 2);

    h.routes.set_channels_for(
        "first",
        vec![ChannelBuilder::new("south").with_latency(35.0).build()],
    );
    let allocations = h.controller.schedule_next(1).await.unwrap();
    assert_eq!(allocations.len(), 1);
    assert_eq!(allocations[0].request_id, "first");
}

#[tokio::test]
async fn test_window_limit_defers_the_rest() {
    let mut config = AppConfig::default();
    config.scheduling.max_per_window = 1;
    let h = harness(config).await;
    admit_all(&h.controller, &[1.0, 2.0, 3.0]).await;

    let allocations = h.controller.schedule_next(3).await.unwrap();
    assert_eq!(allocations.len(), 1);
    assert_eq!(allocations[0].request_id, "req-2");
    assert_eq!(h.controller.queue_depth().await, 2);

    // next window admits again
    h.clock
        .advance(Duration::minutes(h.controller.config().scheduling.window_minutes));
    let allocations = h.controller.schedule_next(3).await.unwrap();
    assert_eq!(allocations.len(), 1);
    assert_eq!(allocations[0].request_id, "req-1");
}

#[tokio::test]
async fn test_no_route_keeps_berths_free() {
    let h = harness(AppConfig::default()).await;
    admit_all(&h.controller, &[1.0]).await;
    h.routes.set_channels_for("req-0", vec![]);

    let allocations = h.controller.schedule_next(1).await.unwrap();
    assert!(allocations.is_empty());
    assert!(h
        .controller
        .berths()
        .snapshot()
        .iter()
        .all(|slot| slot.state == BerthState::Available));
    assert_eq!(h.controller.queue_depth().await, 1);
}

#[tokio::test]
async fn test_select_route_respects_caller_and_runtime_blocks() {
    let h = harness(AppConfig::default()).await;
    let candidates = vec![
        ChannelBuilder::new("a").with_latency(5.0).build(),
        ChannelBuilder::new("b").with_latency(3.0).build(),
        ChannelBuilder::new("c").with_latency(4.0).build(),
    ];

    let chosen = h
        .controller
        .select_route(&candidates, &HashSet::new())
        .await
        .unwrap();
    assert_eq!(chosen.id, "b");

    h.controller.routes().block("c").await;
    let blocked: HashSet<String> = ["b".to_string()].into_iter().collect();
    let chosen = h.controller.select_route(&candidates, &blocked).await.unwrap();
    assert_eq!(chosen.id, "a");

    let blocked: HashSet<String> = ["a".to_string(), "b".to_string()].into_iter().collect();
    assert!(matches!(
        h.controller.select_route(&candidates, &blocked).await,
        Err(DispatchError::NoRouteAvailable { .. })
    ));
}

#[tokio::test]
async fn test_expired_reservation_is_swept() {
    let h = harness(AppConfig::default()).await;
    admit_all(&h.controller, &[1.0]).await;
    let allocation = h.controller.schedule_next(1).await.unwrap().remove(0);

    let sweeper = h.controller.reservation_sweeper();
    assert!(sweeper.sweep_once().await.is_empty());

    let ttl = h.controller.config().scheduling.reservation_ttl_seconds;
    h.clock.advance(Duration::seconds(ttl + 1));
    let expired = sweeper.sweep_once().await;
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].slot_id, allocation.berth_id);
    assert!(h
        .controller
        .booking_calendar()
        .await
        .bookings(&allocation.berth_id)
        .is_empty());
    assert!(h.controller.confirm_arrival(&allocation).await.is_err());
}

#[tokio::test]
async fn test_taking_over_expired_berth_cancels_old_booking() {
    let mut config = AppConfig::default();
    config.port.berths.truncate(1);
    let h = harness(config).await;

    let start = h.clock.now();
    let early = DispatchRequestBuilder::new()
        .with_id("v1")
        .with_eta(start + Duration::hours(10))
        .build();
    assert!(h.controller.admit(early).await.is_accepted());
    let first = h.controller.schedule_next(1).await.unwrap();
    assert_eq!(first[0].berth_id, "B1");

    // v1's reservation lapses long before its booked window
    h.clock.advance(Duration::hours(2));
    let late = DispatchRequestBuilder::new()
        .with_id("v2")
        .with_eta(h.clock.now())
        .build();
    assert!(h.controller.admit(late).await.is_accepted());
    let second = h.controller.schedule_next(1).await.unwrap();
    assert_eq!(second[0].berth_id, "B1");

    let slot = h.controller.berths().get("B1").unwrap();
    assert_eq!(slot.assigned_vessel.as_deref(), Some("v2"));
    let holders: Vec<_> = h
        .controller
        .booking_calendar()
        .await
        .bookings("B1")
        .into_iter()
        .map(|booking| booking.request_id)
        .collect();
    assert_eq!(holders, vec!["v2"]);
    assert!(h.controller.reservation_sweeper().sweep_once().await.is_empty());
}

#[tokio::test]
async fn test_checkpoint_compacts_journal_behind_retention() {
    let mut config = AppConfig::default();
    config.checkpoint.journal_retention = 1;
    let h = harness(config).await;
    admit_all(&h.controller, &[1.0, 2.0]).await;

    assert_eq!(h.controller.schedule_next(2).await.unwrap().len(), 2);
    assert_eq!(h.controller.checkpoints().get(ALLOCATION_STREAM).await, Some(2));

    let retained = h.controller.journal().events(ALLOCATION_STREAM).await;
    assert_eq!(retained.len(), 1);
    assert_eq!(retained[0].sequence, 2);
    assert_eq!(h.controller.journal().total_events().await, 2);
}

#[tokio::test]
async fn test_arrival_and_departure() {
    let h = harness(AppConfig::default()).await;
    admit_all(&h.controller, &[1.0]).await;
    let allocation = h.controller.schedule_next(1).await.unwrap().remove(0);

    h.controller.confirm_arrival(&allocation).await.unwrap();
    assert_eq!(
        h.controller.berths().get(&allocation.berth_id).unwrap().state,
        BerthState::Occupied
    );

    h.controller.depart(&allocation).await.unwrap();
    assert_eq!(
        h.controller.berths().get(&allocation.berth_id).unwrap().state,
        BerthState::Available
    );
    assert!(h.controller.depart(&allocation).await.is_err());
}

#[tokio::test]
async fn test_recovery_snapshot_restores_into_new_controller() {
    let mut config = AppConfig::default();
    config.resilience.capacity_service.failure_threshold = 1;
    let h = harness(config.clone()).await;
    admit_all(&h.controller, &[1.0, 2.0]).await;
    h.controller.schedule_next(2).await.unwrap();
    h.capacity.set_failing(true);
    let _ = h.controller.schedule_next(1).await;

    let snapshot = h.controller.recovery_snapshot().await;
    assert_eq!(snapshot.checkpoints.get(ALLOCATION_STREAM), Some(&2));
    let encoded = serde_json::to_string(&snapshot).unwrap();

    let restored = harness(config).await;
    restored
        .controller
        .restore(&serde_json::from_str(&encoded).unwrap())
        .await
        .unwrap();
    assert_eq!(
        restored.controller.checkpoints().get(ALLOCATION_STREAM).await,
        Some(2)
    );
    let breaker = restored
        .controller
        .breakers()
        .get("capacity-service")
        .await
        .unwrap();
    assert_eq!(breaker.get_state().await, CircuitState::Open);
}
