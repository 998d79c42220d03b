//! Concurrent writers against one location.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

mod common;

use common::{guard, harness};
use futures::future::join_all;
use gatepass_core::error::GatePassError;
use gatepass_core::gate_pass::GatePassStatus;
use gatepass_core::pickup::total_quantity;
use gatepass_core::types::Quantity;
use gatepass_testing::properties::pickup_attempts;
use proptest::prelude::*;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_pickups_never_oversell_a_location() {
    let h = harness();
    let lot = h.lot(100).await;
    let first = h.approved_pass(&lot, 60, 60).await;
    let second = h.approved_pass(&lot, 40, 40).await;

    // Manual correction: only 40 units are left for both passes.
    let left = h
        .engine
        .ledger()
        .deduct(&lot.location, Quantity::new(60))
        .await
        .unwrap();
    assert_eq!(left, Quantity::new(40));

    let a = {
        let engine = h.engine.clone();
        tokio::spawn(async move {
            engine
                .record_pickup(first.id, Quantity::new(40), guard(), vec![])
                .await
        })
    };
    let b = {
        let engine = h.engine.clone();
        tokio::spawn(async move {
            engine
                .record_pickup(second.id, Quantity::new(40), guard(), vec![])
                .await
        })
    };
    let results = [a.await.unwrap(), b.await.unwrap()];

    let accepted = results.iter().filter(|result| result.is_ok()).count();
    assert_eq!(accepted, 1, "exactly one pickup must win: {results:?}");

    let rejected = results.iter().find_map(|result| result.as_ref().err()).unwrap();
    assert!(
        matches!(
            rejected,
            GatePassError::InsufficientInventory { available, .. } if *available == Quantity::ZERO
        ),
        "unexpected rejection: {rejected:?}"
    );

    assert_eq!(h.inventory().await, Quantity::ZERO);
    assert_eq!(h.store.all_pickups().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_pickups_on_one_pass_respect_approval() {
    let h = harness();
    let lot = h.lot(500).await;
    let pass = h.approved_pass(&lot, 100, 100).await;

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let engine = h.engine.clone();
            tokio::spawn(async move {
                engine
                    .record_pickup(pass.id, Quantity::new(30), guard(), vec![])
                    .await
            })
        })
        .collect();

    let mut accepted = 0;
    for result in join_all(tasks).await {
        match result.unwrap() {
            Ok(_) => accepted += 1,
            Err(GatePassError::QuantityExceedsApproval { .. }) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(accepted, 3);

    let stored = h.engine.get(pass.id).await.unwrap();
    assert_eq!(stored.total_picked_up, Quantity::new(90));
    assert_eq!(stored.status, GatePassStatus::PartiallyCompleted);

    let pickups = h.engine.list_pickups(pass.id).await.unwrap();
    let sequences: Vec<u32> = pickups.iter().map(|pickup| pickup.sequence).collect();
    assert_eq!(sequences, vec![1, 2, 3]);
    assert_eq!(total_quantity(&pickups), Quantity::new(90));
    assert_eq!(h.inventory().await, Quantity::new(410));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_approvals_cannot_overcommit_stock() {
    let h = harness();
    let lot = h.lot(100).await;

    let mut pending = Vec::new();
    for _ in 0..2 {
        pending.push(
            h.engine
                .create(lot.id, common::requester(), common::clerk(), Quantity::new(60))
                .await
                .unwrap(),
        );
    }

    let tasks: Vec<_> = pending
        .iter()
        .map(|pass| {
            let engine = h.engine.clone();
            let pass_id = pass.id;
            tokio::spawn(async move {
                engine
                    .approve(pass_id, Quantity::new(60), common::manager())
                    .await
            })
        })
        .collect();

    let mut approved = 0;
    for result in join_all(tasks).await {
        match result.unwrap() {
            Ok(_) => approved += 1,
            Err(GatePassError::InvalidQuantity { .. }) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(approved, 1);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn pickup_totals_match_events_and_ledger(attempts in pickup_attempts(80, 12)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let h = harness();
            let lot = h.lot(200).await;
            let pass = h.approved_pass(&lot, 150, 150).await;

            for quantity in attempts {
                let _ = h.engine.record_pickup(pass.id, quantity, guard(), vec![]).await;
            }

            let stored = h.engine.get(pass.id).await.unwrap();
            let pickups = h.engine.list_pickups(pass.id).await.unwrap();

            prop_assert_eq!(total_quantity(&pickups), stored.total_picked_up);
            prop_assert!(stored.total_picked_up <= Quantity::new(150));
            prop_assert_eq!(pickups.len(), stored.pickup_count as usize);
            prop_assert!(pickups.iter().all(|pickup| !pickup.quantity.is_zero()));
            prop_assert_eq!(
                h.inventory().await.units() + stored.total_picked_up.units(),
                200
            );
            prop_assert_eq!(
                stored.status == GatePassStatus::Completed,
                stored.total_picked_up == Quantity::new(150)
            );
            Ok(())
        })?;
    }
}
