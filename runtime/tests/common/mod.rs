//! Shared fixtures for the engine integration tests.

#![allow(dead_code)]

use chrono::Duration as ChronoDuration;
use gatepass_core::environment::Clock;
use gatepass_core::gate_pass::GatePass;
use gatepass_core::lot::Lot;
use gatepass_core::store::RecordStore;
use gatepass_core::types::{ActorId, CustomerId, LocationKey, Quantity};
use gatepass_runtime::{EngineConfig, GatePassEngine, RetryPolicy};
use gatepass_testing::{InMemoryRecordStore, ManualClock, test_clock};
use std::sync::Arc;
use std::time::Duration;

pub const BAY: &str = "bay-1";

/// Engine over an in-memory store and a manual clock.
pub struct Harness {
    pub engine: GatePassEngine,
    pub store: Arc<InMemoryRecordStore>,
    pub clock: Arc<ManualClock>,
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::builder()
        .max_retries(8)
        .initial_delay(Duration::from_millis(1))
        .max_delay(Duration::from_millis(5))
        .build()
}

pub fn harness() -> Harness {
    harness_with(EngineConfig::default().with_retry(fast_retry()))
}

pub fn harness_with(config: EngineConfig) -> Harness {
    gatepass_testing::init_test_tracing();
    let store = Arc::new(InMemoryRecordStore::new());
    let clock = Arc::new(test_clock());

    let shared_store: Arc<dyn RecordStore> = store.clone();
    let shared_clock: Arc<dyn Clock> = clock.clone();
    let engine = GatePassEngine::new(shared_store, shared_clock, config);

    Harness {
        engine,
        store,
        clock,
    }
}

pub fn requester() -> ActorId {
    ActorId::new("driver-7")
}

pub fn clerk() -> ActorId {
    ActorId::new("clerk-2")
}

pub fn manager() -> ActorId {
    ActorId::new("manager-1")
}

pub fn guard() -> ActorId {
    ActorId::new("guard-4")
}

impl Harness {
    pub async fn lot(&self, units: u64) -> Lot {
        self.engine
            .register_lot(
                CustomerId::new(),
                LocationKey::new(BAY),
                "bagged rice".to_string(),
                Quantity::new(units),
            )
            .await
            .unwrap()
    }

    /// A pass approved for `approved` units against `lot`.
    pub async fn approved_pass(&self, lot: &Lot, requested: u64, approved: u64) -> GatePass {
        let pass = self
            .engine
            .create(lot.id, requester(), clerk(), Quantity::new(requested))
            .await
            .unwrap();
        self.engine
            .approve(pass.id, Quantity::new(approved), manager())
            .await
            .unwrap()
    }

    pub async fn inventory(&self) -> Quantity {
        self.engine
            .ledger()
            .current_quantity(&LocationKey::new(BAY))
            .await
            .unwrap()
    }

    pub fn advance(&self, by: ChronoDuration) {
        self.clock.advance(by);
    }
}
