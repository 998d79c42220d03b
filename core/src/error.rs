//! Error taxonomy for gate pass operations.
//!
//! Business-rule violations are terminal for the call and are returned to the
//! caller verbatim. Storage conflicts and timeouts are transient: the runtime
//! retries them with backoff before surfacing them.

use crate::gate_pass::GatePassStatus;
use crate::store::StoreError;
use crate::types::{GatePassId, LocationKey, LotId, Quantity};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Operation a state check was performed for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    /// Creating a pass
    Create,
    /// Approving a pending pass
    Approve,
    /// Recording a pickup
    RecordPickup,
    /// Expiring a pass
    Expire,
}

impl Operation {
    /// Stable name used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Approve => "approve",
            Self::RecordPickup => "record_pickup",
            Self::Expire => "expire",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by gate pass operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatePassError {
    /// A quantity was zero, overflowed, or exceeded what may be requested.
    #[error("Invalid quantity: {reason}")]
    InvalidQuantity {
        /// Why the quantity was rejected
        reason: String,
    },

    /// The operation is not legal in the pass's current state.
    #[error("Cannot {operation} gate pass {pass_id} in state {status}")]
    InvalidState {
        /// The pass
        pass_id: GatePassId,
        /// Its current state
        status: GatePassStatus,
        /// What was attempted
        operation: Operation,
    },

    /// The approval window has lapsed (or the pass was already expired).
    #[error("Approval window of gate pass {pass_id} closed at {expires_at}")]
    WindowExpired {
        /// The pass
        pass_id: GatePassId,
        /// When the window closed
        expires_at: DateTime<Utc>,
    },

    /// A pickup would push the cumulative quantity above the approved quantity.
    #[error(
        "Pickup of {requested} exceeds approval of gate pass {pass_id}: {picked_up} of {approved} already picked up"
    )]
    QuantityExceedsApproval {
        /// The pass
        pass_id: GatePassId,
        /// Quantity of the rejected pickup
        requested: Quantity,
        /// Cumulative quantity before the pickup
        picked_up: Quantity,
        /// Approved quantity
        approved: Quantity,
    },

    /// The location does not hold enough stock.
    #[error("Insufficient inventory at {location}: requested {requested}, available {available}")]
    InsufficientInventory {
        /// The location
        location: LocationKey,
        /// Requested deduction
        requested: Quantity,
        /// Stock on hand
        available: Quantity,
    },

    /// No lot with this id.
    #[error("Lot not found: {0}")]
    LotNotFound(LotId),

    /// No gate pass with this id.
    #[error("Gate pass not found: {0}")]
    PassNotFound(GatePassId),

    /// No counter exists for this location.
    #[error("Location not found: {0}")]
    LocationNotFound(LocationKey),

    /// Optimistic concurrency conflict that survived all retries.
    #[error("Storage conflict: {0}")]
    StorageConflict(String),

    /// A storage call did not finish within its deadline.
    #[error("Storage operation timed out after {millis}ms")]
    StorageTimeout {
        /// The deadline in milliseconds
        millis: u64,
    },

    /// Unrecoverable storage or infrastructure failure.
    #[error("Storage failure: {0}")]
    Storage(String),
}

impl GatePassError {
    /// Shorthand for [`GatePassError::InvalidQuantity`].
    #[must_use]
    pub fn invalid_quantity(reason: impl Into<String>) -> Self {
        Self::InvalidQuantity {
            reason: reason.into(),
        }
    }

    /// Whether retrying the same call could succeed without new information.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::StorageConflict(_) | Self::StorageTimeout { .. })
    }

    /// Whether this is a business-rule rejection (as opposed to infrastructure).
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        !matches!(
            self,
            Self::StorageConflict(_) | Self::StorageTimeout { .. } | Self::Storage(_)
        )
    }

    /// Stable label for metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidQuantity { .. } => "invalid_quantity",
            Self::InvalidState { .. } => "invalid_state",
            Self::WindowExpired { .. } => "window_expired",
            Self::QuantityExceedsApproval { .. } => "quantity_exceeds_approval",
            Self::InsufficientInventory { .. } => "insufficient_inventory",
            Self::LotNotFound(_) => "lot_not_found",
            Self::PassNotFound(_) => "pass_not_found",
            Self::LocationNotFound(_) => "location_not_found",
            Self::StorageConflict(_) => "storage_conflict",
            Self::StorageTimeout { .. } => "storage_timeout",
            Self::Storage(_) => "storage",
        }
    }
}

impl From<StoreError> for GatePassError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Conflict { .. } => Self::StorageConflict(error.to_string()),
            StoreError::Database(_) | StoreError::Serialization(_) => Self::Storage(error.to_string()),
        }
    }
}
