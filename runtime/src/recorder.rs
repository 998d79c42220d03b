//! Pickup recorder.
//!
//! Records one withdrawal increment against a gate pass: validates it through
//! the state machine, then commits the inventory deduction, the pickup event,
//! the pass's new cumulative total and the audit entry as one atomic write.
//! A concurrent writer on the pass or on the location counter makes the
//! commit conflict; the whole cycle is then re-run from a fresh read.

use crate::retry::{RetryPolicy, retry_transient};
use crate::storage::{ReadVersions, Storage, commit_for};
use gatepass_core::error::GatePassError;
use gatepass_core::gate_pass::GatePass;
use gatepass_core::machine::{
    GatePassAction, GatePassEnvironment, GatePassEvent, GatePassReducer, GatePassState,
};
use gatepass_core::pickup::PickupEvent;
use gatepass_core::reducer::{Events, Reducer};
use gatepass_core::types::{Actor, ActorId, GatePassId, PickupId, Quantity};
use gatepass_core::version::Versioned;

/// An accepted pickup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedPickup {
    /// The pass after the pickup
    pub pass: GatePass,
    /// The appended pickup event
    pub pickup: PickupEvent,
    /// Units left at the location
    pub remaining_inventory: Quantity,
}

impl RecordedPickup {
    /// Whether this pickup completed the pass.
    #[must_use]
    pub fn completed(&self) -> bool {
        self.pass.completed_at.is_some()
    }
}

/// Appends pickup events and keeps the pass total and the ledger in step.
#[derive(Clone)]
pub struct PickupRecorder {
    storage: Storage,
    environment: GatePassEnvironment,
    reducer: GatePassReducer,
    retry: RetryPolicy,
}

impl PickupRecorder {
    pub(crate) fn new(
        storage: Storage,
        environment: GatePassEnvironment,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            storage,
            environment,
            reducer: GatePassReducer::new(),
            retry,
        }
    }

    /// Record a pickup of `quantity` units.
    ///
    /// # Errors
    ///
    /// - [`GatePassError::InvalidQuantity`] for zero
    /// - [`GatePassError::WindowExpired`] if the window has lapsed or the pass
    ///   was expired
    /// - [`GatePassError::InvalidState`] if the pass is pending or completed
    /// - [`GatePassError::QuantityExceedsApproval`]
    /// - [`GatePassError::InsufficientInventory`]
    /// - [`GatePassError::PassNotFound`], [`GatePassError::LocationNotFound`]
    /// - storage errors once retries are exhausted
    pub async fn record(
        &self,
        pass_id: GatePassId,
        quantity: Quantity,
        actor: ActorId,
        location_tags: Vec<String>,
    ) -> Result<(RecordedPickup, Events<GatePassEvent>), GatePassError> {
        let pickup_id = PickupId::new();
        retry_transient(&self.retry, "record_pickup", || {
            self.attempt(
                pass_id,
                pickup_id,
                quantity,
                actor.clone(),
                location_tags.clone(),
            )
        })
        .await
    }

    async fn attempt(
        &self,
        pass_id: GatePassId,
        pickup_id: PickupId,
        quantity: Quantity,
        actor: ActorId,
        location_tags: Vec<String>,
    ) -> Result<(RecordedPickup, Events<GatePassEvent>), GatePassError> {
        let stored = self.storage.load_pass(pass_id).await?;
        let counter = self.storage.load_counter(&stored.record.location).await?;

        let versions = ReadVersions {
            pass: Some(stored.version),
            counter: counter.as_ref().map(|counter| counter.version),
            lock_counter: false,
        };
        let mut state = GatePassState {
            pass: Some(stored.record),
            counter: counter.map(Versioned::into_record),
            ..GatePassState::default()
        };

        let events = self.reducer.reduce(
            &mut state,
            GatePassAction::RecordPickup {
                pass_id,
                pickup_id,
                quantity,
                actor: actor.clone(),
                location_tags,
            },
            &self.environment,
        )?;

        self.storage
            .commit(commit_for(&state, versions, &events, &Actor::User(actor)))
            .await?;

        let pickup = events.iter().find_map(|event| match event {
            GatePassEvent::PickupRecorded { pickup, .. } => Some(pickup.clone()),
            _ => None,
        });
        let (Some(pass), Some(pickup), Some(counter)) = (state.pass, pickup, state.counter) else {
            return Err(GatePassError::Storage(format!(
                "pickup on gate pass {pass_id} produced an incomplete record"
            )));
        };

        tracing::debug!(
            %pass_id,
            sequence = pickup.sequence,
            %quantity,
            total = %pass.total_picked_up,
            "Pickup recorded"
        );

        Ok((
            RecordedPickup {
                pass,
                pickup,
                remaining_inventory: counter.quantity,
            },
            events,
        ))
    }
}
