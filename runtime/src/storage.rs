//! Storage access with deadlines, and commit assembly.

use gatepass_core::audit::AuditEntry;
use gatepass_core::error::GatePassError;
use gatepass_core::gate_pass::GatePass;
use gatepass_core::ledger::LocationCounter;
use gatepass_core::lot::Lot;
use gatepass_core::machine::{GatePassEvent, GatePassState};
use gatepass_core::store::{Commit, CounterWrite, PassWrite, RecordStore, StoreFuture};
use gatepass_core::types::{Actor, GatePassId, LocationKey, LotId, Quantity};
use gatepass_core::version::{Version, Versioned};
use gatepass_core::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

/// A record store whose every call is bounded by a deadline.
#[derive(Clone)]
pub(crate) struct Storage {
    store: Arc<dyn RecordStore>,
    deadline: Duration,
}

impl Storage {
    pub(crate) fn new(store: Arc<dyn RecordStore>, deadline: Duration) -> Self {
        Self { store, deadline }
    }

    pub(crate) fn store(&self) -> &dyn RecordStore {
        self.store.as_ref()
    }

    /// Await a store call, surfacing [`GatePassError::StorageTimeout`] once
    /// the deadline passes.
    pub(crate) async fn call<T>(&self, future: StoreFuture<'_, T>) -> Result<T, GatePassError> {
        match tokio::time::timeout(self.deadline, future).await {
            Ok(result) => result.map_err(GatePassError::from),
            Err(_) => {
                let millis = u64::try_from(self.deadline.as_millis()).unwrap_or(u64::MAX);
                tracing::warn!(deadline_ms = millis, "Storage call timed out");
                Err(GatePassError::StorageTimeout { millis })
            }
        }
    }

    pub(crate) async fn load_pass(
        &self,
        id: GatePassId,
    ) -> Result<Versioned<GatePass>, GatePassError> {
        self.call(self.store.load_pass(id))
            .await?
            .ok_or(GatePassError::PassNotFound(id))
    }

    pub(crate) async fn load_lot(&self, id: LotId) -> Result<Option<Lot>, GatePassError> {
        self.call(self.store.load_lot(id)).await
    }

    pub(crate) async fn load_counter(
        &self,
        location: &LocationKey,
    ) -> Result<Option<Versioned<LocationCounter>>, GatePassError> {
        self.call(self.store.load_counter(location.clone())).await
    }

    /// Stock at `location` committed to live passes other than `excluding`.
    pub(crate) async fn committed_at(
        &self,
        location: &LocationKey,
        excluding: Option<GatePassId>,
        now: DateTime<Utc>,
    ) -> Result<Quantity, GatePassError> {
        let passes = self
            .call(self.store.list_passes_by_location(location.clone()))
            .await?;
        Ok(passes
            .iter()
            .filter(|pass| Some(pass.id) != excluding)
            .map(|pass| pass.outstanding_commitment(now))
            .sum())
    }

    /// Units of `lot_id` already picked up by any pass, plus the commitments
    /// of its live passes other than `excluding`.
    pub(crate) async fn drawn_from_lot(
        &self,
        lot_id: LotId,
        excluding: Option<GatePassId>,
        now: DateTime<Utc>,
    ) -> Result<Quantity, GatePassError> {
        let passes = self.call(self.store.list_passes_by_lot(lot_id)).await?;
        let picked = passes.iter().map(|pass| pass.total_picked_up);
        let committed = passes
            .iter()
            .filter(|pass| Some(pass.id) != excluding)
            .map(|pass| pass.outstanding_commitment(now));
        Ok(picked.chain(committed).sum())
    }

    pub(crate) async fn commit(&self, commit: Commit) -> Result<(), GatePassError> {
        self.call(self.store.commit(commit)).await
    }
}

/// Versions the records of a [`GatePassState`] were read at.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct ReadVersions {
    /// `None` when the pass is being created
    pub(crate) pass: Option<Version>,
    /// `None` when no counter was read
    pub(crate) counter: Option<Version>,
    /// Rewrite the counter even if unchanged, so that concurrent writers at
    /// the location conflict
    pub(crate) lock_counter: bool,
}

/// Turns the state after a reduction and its events into one commit.
///
/// The pass row is always written first, then the counter.
pub(crate) fn commit_for(
    state: &GatePassState,
    versions: ReadVersions,
    events: &[GatePassEvent],
    actor: &Actor,
) -> Commit {
    let pass = state.pass.clone().map(|pass| match versions.pass {
        Some(expected) => PassWrite::Update { pass, expected },
        None => PassWrite::Insert(pass),
    });

    let deducted = events
        .iter()
        .any(|event| matches!(event, GatePassEvent::InventoryDeducted { .. }));
    let counters = match (&state.counter, versions.counter) {
        (Some(counter), Some(expected)) if deducted || versions.lock_counter => {
            vec![CounterWrite::Update {
                counter: counter.clone(),
                expected,
            }]
        }
        _ => Vec::new(),
    };

    let pickups = events
        .iter()
        .filter_map(|event| match event {
            GatePassEvent::PickupRecorded { pickup, .. } => Some(pickup.clone()),
            _ => None,
        })
        .collect();

    let audit = events
        .iter()
        .filter_map(|event| AuditEntry::for_event(event, actor))
        .collect();

    Commit {
        lot: None,
        pass,
        counters,
        pickups,
        audit,
    }
}
