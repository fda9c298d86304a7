use std::sync::Arc;

use chrono::Duration;
use futures::future::join_all;
use harbor_core::{BerthSlot, BerthState, DispatchError};
use harbor_dispatcher::BerthRegistry;
use harbor_testing_utils::{test_epoch, BerthSlotBuilder, DispatchRequestBuilder};

fn registry(slots: Vec<BerthSlot>) -> Arc<BerthRegistry> {
    Arc::new(BerthRegistry::new(slots).unwrap())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_slot_has_exactly_one_winner() {
    let registry = registry(vec![BerthSlotBuilder::new().with_id("B1").build()]);
    let now = test_epoch();
    let until = now + Duration::minutes(30);

    let handles = (0..16).map(|i| {
        let registry = registry.clone();
        tokio::spawn(async move { registry.try_reserve("B1", &format!("v{i}"), until, now) })
    });
    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, DispatchError::BerthConflict { .. })));
    assert_eq!(registry.get("B1").unwrap().state, BerthState::Reserved);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_first_fit_losers_move_to_next_slot() {
    let registry = registry(vec![
        BerthSlotBuilder::new().with_id("B1").build(),
        BerthSlotBuilder::new().with_id("B2").build(),
        BerthSlotBuilder::new().with_id("B3").build(),
    ]);
    let now = test_epoch();
    let until = now + Duration::minutes(30);
    let cargo = DispatchRequestBuilder::new().build().cargo;

    let handles = (0..5).map(|i| {
        let registry = registry.clone();
        tokio::spawn(async move {
            registry.reserve_first_fit(&cargo, 0.0, &format!("v{i}"), until, now, |_| true)
        })
    });
    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let mut won: Vec<String> = results.iter().filter_map(|r| r.as_ref().ok().cloned()).collect();
    won.sort();
    assert_eq!(won, vec!["B1", "B2", "B3"]);
    assert_eq!(
        results
            .iter()
            .filter(|r| matches!(r, Err(DispatchError::NoBerthAvailable { .. })))
            .count(),
        2
    );

    // every slot ends up held by exactly one distinct vessel
    let holders: std::collections::HashSet<_> = registry
        .snapshot()
        .into_iter()
        .filter_map(|slot| slot.assigned_vessel)
        .collect();
    assert_eq!(holders.len(), 3);
}

#[tokio::test]
async fn test_maintenance_slot_is_skipped() {
    let registry = registry(vec![
        BerthSlotBuilder::new().with_id("B1").in_maintenance().build(),
        BerthSlotBuilder::new().with_id("B2").build(),
    ]);
    let now = test_epoch();
    let cargo = DispatchRequestBuilder::new().build().cargo;
    let slot = registry
        .reserve_first_fit(&cargo, 0.0, "v1", now + Duration::minutes(5), now, |_| true)
        .unwrap();
    assert_eq!(slot, "B2");
}
