//! The gate pass state machine.
//!
//! [`GatePassReducer`] is the single authoritative transition function for
//! every gate pass operation. It is pure: given the records loaded for one
//! operation ([`GatePassState`]), an action, and the environment (clock and
//! approval window), it either rejects the action with a named
//! [`GatePassError`] and leaves the state untouched, or applies the resulting
//! [`GatePassEvent`]s to the state and returns them.
//!
//! The runtime turns the returned events into one atomic storage commit
//! (pass row, location counter, pickup row, audit entries).
//!
//! ```text
//! Create ──▶ PassCreated
//! Approve ──▶ PassApproved
//! RecordPickup ──▶ InventoryDeducted, PickupRecorded [, PassCompleted]
//! Expire ──▶ PassExpired | (nothing, when not due)
//! ```

use crate::environment::Clock;
use crate::error::{GatePassError, Operation};
use crate::gate_pass::{GatePass, GatePassStatus};
use crate::ledger::LocationCounter;
use crate::lot::Lot;
use crate::pickup::PickupEvent;
use crate::reducer::{Events, Reducer};
use crate::types::{ActorId, GatePassId, LocationKey, LotId, PickupId, Quantity};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use smallvec::{SmallVec, smallvec};
use std::sync::Arc;

/// Default approval window: 15 hours.
pub const DEFAULT_APPROVAL_WINDOW_HOURS: i64 = 15;

// ============================================================================
// State
// ============================================================================

/// Records loaded for a single gate pass operation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GatePassState {
    /// The pass being operated on (`None` before creation)
    pub pass: Option<GatePass>,
    /// The pass's lot (required for creation)
    pub lot: Option<Lot>,
    /// Counter of the lot's location
    pub counter: Option<LocationCounter>,
    /// Stock at the location already committed to *other* live passes
    pub committed: Quantity,
    /// Units of the lot already picked up by any pass, plus the commitments
    /// of the lot's *other* live passes
    pub lot_drawn: Quantity,
}

impl GatePassState {
    /// State for an existing pass.
    #[must_use]
    pub fn for_pass(pass: GatePass) -> Self {
        Self {
            pass: Some(pass),
            ..Self::default()
        }
    }

    /// Stock at the location not committed to live passes.
    #[must_use]
    pub fn available_at_location(&self) -> Quantity {
        self.counter
            .as_ref()
            .map_or(Quantity::ZERO, |counter| counter.quantity)
            .saturating_sub(self.committed)
    }

    /// Units of the loaded lot neither picked up nor committed elsewhere.
    #[must_use]
    pub fn available_in_lot(&self) -> Option<Quantity> {
        self.lot
            .as_ref()
            .map(|lot| lot.received_quantity.saturating_sub(self.lot_drawn))
    }

    /// What a new claim may take: the lot's own remainder, bounded by the
    /// uncommitted stock at its location.
    #[must_use]
    pub fn available(&self) -> Quantity {
        let at_location = self.available_at_location();
        self.available_in_lot()
            .map_or(at_location, |in_lot| in_lot.min(at_location))
    }
}

// ============================================================================
// Actions (commands)
// ============================================================================

/// Commands accepted by the gate pass state machine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatePassAction {
    /// Create a pending pass against a lot
    Create {
        /// Id for the new pass
        pass_id: GatePassId,
        /// Lot to withdraw from
        lot_id: LotId,
        /// Who the goods are released to
        requester: ActorId,
        /// Who is creating the pass
        issued_by: ActorId,
        /// Quantity asked for
        requested_quantity: Quantity,
    },

    /// Approve a pending pass and start its window
    Approve {
        /// Pass to approve
        pass_id: GatePassId,
        /// Quantity authorized
        approved_quantity: Quantity,
        /// Who approves
        approver: ActorId,
    },

    /// Record one withdrawal increment
    RecordPickup {
        /// Pass to pick up against
        pass_id: GatePassId,
        /// Id for the new pickup event
        pickup_id: PickupId,
        /// Units withdrawn
        quantity: Quantity,
        /// Who records the pickup
        actor: ActorId,
        /// Free-form location descriptors
        location_tags: Vec<String>,
    },

    /// Expire the pass if its window has lapsed
    Expire {
        /// Pass to expire
        pass_id: GatePassId,
    },
}

impl GatePassAction {
    /// The pass this action targets.
    #[must_use]
    pub const fn pass_id(&self) -> GatePassId {
        match self {
            Self::Create { pass_id, .. }
            | Self::Approve { pass_id, .. }
            | Self::RecordPickup { pass_id, .. }
            | Self::Expire { pass_id } => *pass_id,
        }
    }

    /// The operation this action performs.
    #[must_use]
    pub const fn operation(&self) -> Operation {
        match self {
            Self::Create { .. } => Operation::Create,
            Self::Approve { .. } => Operation::Approve,
            Self::RecordPickup { .. } => Operation::RecordPickup,
            Self::Expire { .. } => Operation::Expire,
        }
    }
}

// ============================================================================
// Events
// ============================================================================

/// Facts produced by an accepted action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatePassEvent {
    /// A pending pass was created
    PassCreated {
        /// The new pass
        pass: GatePass,
    },

    /// A pending pass was approved
    PassApproved {
        /// The pass
        pass_id: GatePassId,
        /// Quantity originally requested
        requested_quantity: Quantity,
        /// Quantity authorized
        approved_quantity: Quantity,
        /// Who approved
        approver: ActorId,
        /// When
        approved_at: DateTime<Utc>,
        /// End of the approval window
        expires_at: DateTime<Utc>,
    },

    /// Stock was removed from a location counter
    InventoryDeducted {
        /// The location
        location: LocationKey,
        /// Units removed
        quantity: Quantity,
        /// Units left
        remaining: Quantity,
        /// When
        at: DateTime<Utc>,
    },

    /// A pickup was accepted
    PickupRecorded {
        /// The appended pickup event
        pickup: PickupEvent,
        /// Cumulative quantity before
        total_before: Quantity,
        /// Cumulative quantity after
        total_after: Quantity,
        /// State before
        status_before: GatePassStatus,
        /// State after (`PartiallyCompleted` or `Completed`)
        status_after: GatePassStatus,
    },

    /// The cumulative quantity reached the approved quantity
    PassCompleted {
        /// The pass
        pass_id: GatePassId,
        /// Final cumulative quantity
        total_picked_up: Quantity,
        /// When
        completed_at: DateTime<Utc>,
    },

    /// The approval window lapsed before completion
    PassExpired {
        /// The pass
        pass_id: GatePassId,
        /// State before expiring
        status_before: GatePassStatus,
        /// Approved quantity
        approved_quantity: Quantity,
        /// Snapshot of the cumulative quantity
        final_approved_quantity: Quantity,
        /// When
        expired_at: DateTime<Utc>,
    },
}

impl GatePassEvent {
    /// Stable, versioned event type name.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::PassCreated { .. } => "PassCreated.v1",
            Self::PassApproved { .. } => "PassApproved.v1",
            Self::InventoryDeducted { .. } => "InventoryDeducted.v1",
            Self::PickupRecorded { .. } => "PickupRecorded.v1",
            Self::PassCompleted { .. } => "PassCompleted.v1",
            Self::PassExpired { .. } => "PassExpired.v1",
        }
    }
}

// ============================================================================
// Environment
// ============================================================================

/// Environment dependencies for the gate pass state machine
#[derive(Clone)]
pub struct GatePassEnvironment {
    /// Clock for timestamps and window checks
    pub clock: Arc<dyn Clock>,
    /// Length of the approval window
    pub approval_window: Duration,
}

impl GatePassEnvironment {
    /// Creates a new `GatePassEnvironment`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, approval_window: Duration) -> Self {
        Self {
            clock,
            approval_window,
        }
    }

    /// Environment with the default 15 hour window.
    #[must_use]
    pub fn with_default_window(clock: Arc<dyn Clock>) -> Self {
        Self::new(clock, Duration::hours(DEFAULT_APPROVAL_WINDOW_HOURS))
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer for the gate pass lifecycle.
#[derive(Clone, Copy, Debug, Default)]
pub struct GatePassReducer;

impl GatePassReducer {
    /// Creates a new `GatePassReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn existing(state: &GatePassState, pass_id: GatePassId) -> Result<&GatePass, GatePassError> {
        state
            .pass
            .as_ref()
            .filter(|pass| pass.id == pass_id)
            .ok_or(GatePassError::PassNotFound(pass_id))
    }

    fn create(
        state: &GatePassState,
        pass_id: GatePassId,
        lot_id: LotId,
        requester: ActorId,
        issued_by: ActorId,
        requested_quantity: Quantity,
        now: DateTime<Utc>,
    ) -> Result<Events<GatePassEvent>, GatePassError> {
        if requested_quantity.is_zero() {
            return Err(GatePassError::invalid_quantity(
                "requested quantity must be greater than zero",
            ));
        }

        if let Some(pass) = &state.pass {
            return Err(GatePassError::InvalidState {
                pass_id: pass.id,
                status: pass.status,
                operation: Operation::Create,
            });
        }

        let lot = state
            .lot
            .as_ref()
            .filter(|lot| lot.id == lot_id)
            .ok_or(GatePassError::LotNotFound(lot_id))?;

        let available = state.available();
        if requested_quantity > available {
            return Err(GatePassError::invalid_quantity(format!(
                "requested {requested_quantity} exceeds available {available} for lot {lot_id}"
            )));
        }

        let pass = GatePass::pending(
            pass_id,
            lot.id,
            lot.location.clone(),
            requester,
            issued_by,
            requested_quantity,
            now,
        );
        Ok(smallvec![GatePassEvent::PassCreated { pass }])
    }

    fn approve(
        state: &GatePassState,
        pass_id: GatePassId,
        approved_quantity: Quantity,
        approver: ActorId,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<Events<GatePassEvent>, GatePassError> {
        let pass = Self::existing(state, pass_id)?;

        if pass.status != GatePassStatus::Pending {
            return Err(GatePassError::InvalidState {
                pass_id,
                status: pass.status,
                operation: Operation::Approve,
            });
        }

        if approved_quantity.is_zero() {
            return Err(GatePassError::invalid_quantity(
                "approved quantity must be greater than zero",
            ));
        }

        if approved_quantity > pass.requested_quantity {
            return Err(GatePassError::invalid_quantity(format!(
                "approved {approved_quantity} exceeds requested {}",
                pass.requested_quantity
            )));
        }

        let available = state.available();
        if approved_quantity > available {
            return Err(GatePassError::invalid_quantity(format!(
                "approved {approved_quantity} exceeds available {available} for lot {}",
                pass.lot_id
            )));
        }

        Ok(smallvec![GatePassEvent::PassApproved {
            pass_id,
            requested_quantity: pass.requested_quantity,
            approved_quantity,
            approver,
            approved_at: now,
            expires_at: now + window,
        }])
    }

    fn record_pickup(
        state: &GatePassState,
        pass_id: GatePassId,
        pickup_id: PickupId,
        quantity: Quantity,
        actor: ActorId,
        location_tags: Vec<String>,
        now: DateTime<Utc>,
    ) -> Result<Events<GatePassEvent>, GatePassError> {
        let pass = Self::existing(state, pass_id)?;

        if quantity.is_zero() {
            return Err(GatePassError::invalid_quantity(
                "pickup quantity must be greater than zero",
            ));
        }

        // Lost race with the expiration scanner.
        if pass.status == GatePassStatus::Expired {
            return Err(GatePassError::WindowExpired {
                pass_id,
                expires_at: pass.approval_expires_at.unwrap_or(now),
            });
        }

        if !pass.status.is_active() {
            return Err(GatePassError::InvalidState {
                pass_id,
                status: pass.status,
                operation: Operation::RecordPickup,
            });
        }

        let (Some(approved), Some(expires_at)) = (pass.approved_quantity, pass.approval_expires_at)
        else {
            return Err(GatePassError::InvalidState {
                pass_id,
                status: pass.status,
                operation: Operation::RecordPickup,
            });
        };

        if !pass.window_open(now) {
            return Err(GatePassError::WindowExpired {
                pass_id,
                expires_at,
            });
        }

        let total_after = pass
            .total_picked_up
            .checked_add(quantity)
            .filter(|total| *total <= approved)
            .ok_or(GatePassError::QuantityExceedsApproval {
                pass_id,
                requested: quantity,
                picked_up: pass.total_picked_up,
                approved,
            })?;

        let counter = state
            .counter
            .as_ref()
            .filter(|counter| counter.location == pass.location)
            .ok_or_else(|| GatePassError::LocationNotFound(pass.location.clone()))?;
        let remaining =
            counter
                .quantity
                .checked_sub(quantity)
                .ok_or_else(|| GatePassError::InsufficientInventory {
                    location: counter.location.clone(),
                    requested: quantity,
                    available: counter.quantity,
                })?;

        let status_after = if total_after == approved {
            GatePassStatus::Completed
        } else {
            GatePassStatus::PartiallyCompleted
        };

        let pickup = PickupEvent {
            id: pickup_id,
            pass_id,
            sequence: pass.pickup_count + 1,
            quantity,
            location: pass.location.clone(),
            location_tags,
            actor,
            recorded_at: now,
        };

        let mut events: Events<GatePassEvent> = smallvec![
            GatePassEvent::InventoryDeducted {
                location: counter.location.clone(),
                quantity,
                remaining,
                at: now,
            },
            GatePassEvent::PickupRecorded {
                pickup,
                total_before: pass.total_picked_up,
                total_after,
                status_before: pass.status,
                status_after,
            },
        ];

        if status_after == GatePassStatus::Completed {
            events.push(GatePassEvent::PassCompleted {
                pass_id,
                total_picked_up: total_after,
                completed_at: now,
            });
        }

        Ok(events)
    }

    fn expire(
        state: &GatePassState,
        pass_id: GatePassId,
        now: DateTime<Utc>,
    ) -> Result<Events<GatePassEvent>, GatePassError> {
        let pass = Self::existing(state, pass_id)?;

        // Pending, terminal, or window still open: nothing to do.
        if !pass.is_expirable(now) {
            return Ok(SmallVec::new());
        }

        Ok(smallvec![GatePassEvent::PassExpired {
            pass_id,
            status_before: pass.status,
            approved_quantity: pass.approved_quantity.unwrap_or(Quantity::ZERO),
            final_approved_quantity: pass.total_picked_up,
            expired_at: now,
        }])
    }

    /// Applies an event to state
    pub fn apply_event(state: &mut GatePassState, event: &GatePassEvent) {
        match event {
            GatePassEvent::PassCreated { pass } => {
                state.pass = Some(pass.clone());
            }

            GatePassEvent::PassApproved {
                approved_quantity,
                approver,
                approved_at,
                expires_at,
                ..
            } => {
                if let Some(pass) = state.pass.as_mut() {
                    pass.status = GatePassStatus::Approved;
                    pass.approved_quantity = Some(*approved_quantity);
                    pass.approved_by = Some(approver.clone());
                    pass.approved_at = Some(*approved_at);
                    pass.approval_expires_at = Some(*expires_at);
                }
            }

            GatePassEvent::InventoryDeducted { remaining, at, .. } => {
                if let Some(counter) = state.counter.as_mut() {
                    counter.quantity = *remaining;
                    counter.updated_at = *at;
                }
            }

            GatePassEvent::PickupRecorded {
                pickup,
                total_after,
                status_after,
                ..
            } => {
                if let Some(pass) = state.pass.as_mut() {
                    pass.total_picked_up = *total_after;
                    pass.pickup_count = pickup.sequence;
                    pass.status = *status_after;
                }
            }

            GatePassEvent::PassCompleted { completed_at, .. } => {
                if let Some(pass) = state.pass.as_mut() {
                    pass.completed_at = Some(*completed_at);
                }
            }

            GatePassEvent::PassExpired {
                final_approved_quantity,
                expired_at,
                ..
            } => {
                if let Some(pass) = state.pass.as_mut() {
                    pass.status = GatePassStatus::Expired;
                    pass.final_approved_quantity = Some(*final_approved_quantity);
                    pass.expired_at = Some(*expired_at);
                }
            }
        }
    }
}

impl Reducer for GatePassReducer {
    type State = GatePassState;
    type Action = GatePassAction;
    type Event = GatePassEvent;
    type Error = GatePassError;
    type Environment = GatePassEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Result<Events<Self::Event>, Self::Error> {
        let now = env.clock.now();
        let operation = action.operation();
        let pass_id = action.pass_id();

        let decision = match action {
            GatePassAction::Create {
                pass_id,
                lot_id,
                requester,
                issued_by,
                requested_quantity,
            } => Self::create(
                state,
                pass_id,
                lot_id,
                requester,
                issued_by,
                requested_quantity,
                now,
            ),
            GatePassAction::Approve {
                pass_id,
                approved_quantity,
                approver,
            } => Self::approve(
                state,
                pass_id,
                approved_quantity,
                approver,
                now,
                env.approval_window,
            ),
            GatePassAction::RecordPickup {
                pass_id,
                pickup_id,
                quantity,
                actor,
                location_tags,
            } => Self::record_pickup(
                state,
                pass_id,
                pickup_id,
                quantity,
                actor,
                location_tags,
                now,
            ),
            GatePassAction::Expire { pass_id } => Self::expire(state, pass_id, now),
        };

        match decision {
            Ok(events) => {
                for event in &events {
                    Self::apply_event(state, event);
                }
                tracing::debug!(
                    %pass_id,
                    operation = operation.as_str(),
                    events = events.len(),
                    "Gate pass transition accepted"
                );
                Ok(events)
            }
            Err(error) => {
                tracing::debug!(
                    %pass_id,
                    operation = operation.as_str(),
                    error = %error,
                    "Gate pass transition rejected"
                );
                Err(error)
            }
        }
    }
}
