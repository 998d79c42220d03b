//! Expiration scanner and storage fault handling.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

mod common;

use chrono::Duration as ChronoDuration;
use common::{guard, harness, harness_with};
use gatepass_core::error::GatePassError;
use gatepass_core::gate_pass::GatePassStatus;
use gatepass_core::store::{RecordStore, StoreError};
use gatepass_core::types::{GatePassId, Quantity};
use gatepass_core::version::Version;
use gatepass_runtime::{EngineConfig, ExpirationScanner, RetryPolicy, SweepReport};
use std::time::Duration;
use tokio::sync::broadcast;

async fn status_of(h: &common::Harness, pass_id: GatePassId) -> GatePassStatus {
    h.store
        .load_pass(pass_id)
        .await
        .unwrap()
        .unwrap()
        .record
        .status
}

// ============================================================================
// Sweeps
// ============================================================================

#[tokio::test]
async fn sweep_expires_only_lapsed_passes() {
    let h = harness();
    let lot = h.lot(300).await;
    let lapsed = h.approved_pass(&lot, 50, 50).await;
    let partial = h.approved_pass(&lot, 50, 50).await;
    h.engine
        .record_pickup(partial.id, Quantity::new(10), guard(), vec![])
        .await
        .unwrap();

    h.advance(ChronoDuration::hours(3));
    let fresh = h.approved_pass(&lot, 50, 50).await;

    h.advance(ChronoDuration::hours(13));
    let report = h.engine.sweep().await.unwrap();
    assert_eq!(
        report,
        SweepReport {
            examined: 2,
            expired: 2,
            skipped: 0,
            failed: 0,
        }
    );

    assert_eq!(status_of(&h, lapsed.id).await, GatePassStatus::Expired);
    assert_eq!(status_of(&h, partial.id).await, GatePassStatus::Expired);
    assert_eq!(status_of(&h, fresh.id).await, GatePassStatus::Approved);

    let again = h.engine.sweep().await.unwrap();
    assert_eq!(again, SweepReport::default());
}

#[tokio::test]
async fn sweep_continues_past_failing_pass() {
    let h = harness();
    let lot = h.lot(300).await;
    let first = h.approved_pass(&lot, 50, 50).await;
    let broken = h.approved_pass(&lot, 50, 50).await;
    let last = h.approved_pass(&lot, 50, 50).await;
    h.store.poison_pass(broken.id);

    h.advance(ChronoDuration::hours(16));
    let report = h.engine.sweep().await.unwrap();
    assert_eq!(report.examined, 3);
    assert_eq!(report.expired, 2);
    assert_eq!(report.failed, 1);

    assert_eq!(status_of(&h, first.id).await, GatePassStatus::Expired);
    assert_eq!(status_of(&h, broken.id).await, GatePassStatus::Approved);
    assert_eq!(status_of(&h, last.id).await, GatePassStatus::Expired);
}

#[tokio::test]
async fn scanner_task_runs_until_shutdown() {
    let h = harness();
    let lot = h.lot(100).await;
    let pass = h.approved_pass(&lot, 100, 100).await;
    h.advance(ChronoDuration::hours(16));

    let scanner = ExpirationScanner::new(h.engine.clone(), Duration::from_millis(20));
    assert_eq!(scanner.interval(), Duration::from_millis(20));

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = scanner.spawn(shutdown_rx);

    let mut expired = false;
    for _ in 0..100 {
        if status_of(&h, pass.id).await == GatePassStatus::Expired {
            expired = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(expired, "scanner never expired the lapsed pass");

    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("scanner did not stop")
        .unwrap();
}

// ============================================================================
// Storage faults
// ============================================================================

#[tokio::test]
async fn conflicts_are_retried_transparently() {
    let h = harness();
    let lot = h.lot(100).await;
    let pass = h.approved_pass(&lot, 100, 100).await;

    h.store.fail_next_commits(vec![
        StoreError::pass_conflict(pass.id, Version::new(2)),
        StoreError::counter_conflict(&lot.location, Version::new(3)),
    ]);
    let recorded = h
        .engine
        .record_pickup(pass.id, Quantity::new(25), guard(), vec![])
        .await
        .unwrap();

    assert_eq!(recorded.pass.total_picked_up, Quantity::new(25));
    assert_eq!(recorded.pickup.sequence, 1);
    assert_eq!(h.store.rejected_commit_count(), 2);
    assert_eq!(h.store.all_pickups().len(), 1);
}

#[tokio::test]
async fn conflicts_surface_once_retries_run_out() {
    let h = harness_with(
        EngineConfig::default().with_retry(
            RetryPolicy::builder()
                .max_retries(1)
                .initial_delay(Duration::from_millis(1))
                .build(),
        ),
    );
    let lot = h.lot(100).await;
    let pass = h.approved_pass(&lot, 100, 100).await;

    h.store
        .fail_next_commits(vec![StoreError::pass_conflict(pass.id, Version::new(2)); 3]);
    let err = h
        .engine
        .record_pickup(pass.id, Quantity::new(25), guard(), vec![])
        .await
        .unwrap_err();
    assert!(matches!(err, GatePassError::StorageConflict(_)));

    // Nothing was written.
    assert_eq!(h.engine.get(pass.id).await.unwrap().total_picked_up, Quantity::ZERO);
    assert_eq!(h.inventory().await, Quantity::new(100));
}

#[tokio::test]
async fn database_failures_are_not_retried() {
    let h = harness();
    let lot = h.lot(100).await;
    let pass = h.approved_pass(&lot, 100, 100).await;

    h.store.fail_next_commits(vec![
        StoreError::Database("connection reset".to_string()),
        StoreError::Database("connection reset".to_string()),
    ]);
    let err = h
        .engine
        .record_pickup(pass.id, Quantity::new(25), guard(), vec![])
        .await
        .unwrap_err();
    assert!(matches!(err, GatePassError::Storage(_)));
    assert_eq!(h.store.rejected_commit_count(), 1);
}

#[tokio::test]
async fn slow_storage_times_out() {
    let h = harness_with(
        EngineConfig::default()
            .with_storage_timeout(Duration::from_millis(10))
            .with_retry(RetryPolicy::none()),
    );
    let lot = h.lot(100).await;
    let pass = h.approved_pass(&lot, 100, 100).await;

    h.store.set_delay(Some(Duration::from_millis(200)));
    let err = h.engine.get(pass.id).await.unwrap_err();
    assert_eq!(err, GatePassError::StorageTimeout { millis: 10 });

    h.store.set_delay(None);
    assert_eq!(
        h.engine.get(pass.id).await.unwrap().status,
        GatePassStatus::Approved
    );
}

#[tokio::test]
async fn ledger_operations_validate_input() {
    let h = harness();
    let lot = h.lot(100).await;
    let ledger = h.engine.ledger();

    assert!(matches!(
        ledger.deduct(&lot.location, Quantity::ZERO).await.unwrap_err(),
        GatePassError::InvalidQuantity { .. }
    ));
    assert!(matches!(
        ledger.deduct(&lot.location, Quantity::new(101)).await.unwrap_err(),
        GatePassError::InsufficientInventory { .. }
    ));

    let unknown = gatepass_core::types::LocationKey::new("bay-99");
    assert_eq!(
        ledger.credit(&unknown, Quantity::new(5)).await.unwrap_err(),
        GatePassError::LocationNotFound(unknown.clone())
    );
    assert_eq!(
        ledger.current_quantity(&unknown).await.unwrap_err(),
        GatePassError::LocationNotFound(unknown.clone())
    );

    assert_eq!(
        ledger.stock_in(&unknown, Quantity::new(5)).await.unwrap(),
        Quantity::new(5)
    );
    assert_eq!(
        ledger.credit(&lot.location, Quantity::new(20)).await.unwrap(),
        Quantity::new(120)
    );
    assert_eq!(h.inventory().await, Quantity::new(120));
}
