//! The gate pass record and its lifecycle states.

use crate::types::{ActorId, GatePassId, LocationKey, LotId, Quantity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Lifecycle state of a gate pass.
///
/// ```text
/// pending ──approve──▶ approved ──pickup──▶ partially_completed ──pickup──▶ completed
///                          │  └──────────pickup (full)──────────────────────▲
///                          └──────window lapsed──▶ expired ◀──window lapsed─┘
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GatePassStatus {
    /// Created, awaiting approval
    Pending,
    /// Approved, approval window running, nothing picked up yet
    Approved,
    /// Some but not all of the approved quantity has been picked up
    PartiallyCompleted,
    /// The full approved quantity has been picked up (terminal)
    Completed,
    /// The approval window lapsed before completion (terminal)
    Expired,
}

/// Error returned when parsing an unknown status string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid gate pass status: {0}")]
pub struct ParseStatusError(String);

impl GatePassStatus {
    /// All states, in lifecycle order.
    pub const ALL: [Self; 5] = [
        Self::Pending,
        Self::Approved,
        Self::PartiallyCompleted,
        Self::Completed,
        Self::Expired,
    ];

    /// Convert status to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::PartiallyCompleted => "partially_completed",
            Self::Completed => "completed",
            Self::Expired => "expired",
        }
    }

    /// Parse status from database string.
    ///
    /// # Errors
    ///
    /// Returns error if the string doesn't match a known status.
    pub fn parse(s: &str) -> Result<Self, ParseStatusError> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "partially_completed" => Ok(Self::PartiallyCompleted),
            "completed" => Ok(Self::Completed),
            "expired" => Ok(Self::Expired),
            _ => Err(ParseStatusError(s.to_string())),
        }
    }

    /// Approved or partially completed: pickups may still be recorded and the
    /// pass may still expire.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Approved | Self::PartiallyCompleted)
    }

    /// Completed or expired.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Expired)
    }
}

impl fmt::Display for GatePassStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A withdrawal authorization against a lot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatePass {
    /// Pass identifier
    pub id: GatePassId,
    /// Lot the goods are withdrawn from
    pub lot_id: LotId,
    /// Location of the lot (inventory is deducted here)
    pub location: LocationKey,
    /// Who the goods are released to
    pub requester: ActorId,
    /// Who created the pass
    pub issued_by: ActorId,
    /// Quantity asked for at creation (immutable)
    pub requested_quantity: Quantity,
    /// Quantity authorized at approval
    pub approved_quantity: Option<Quantity>,
    /// Sum of all accepted pickups
    pub total_picked_up: Quantity,
    /// Snapshot of `total_picked_up` taken at expiration
    pub final_approved_quantity: Option<Quantity>,
    /// Number of accepted pickups
    pub pickup_count: u32,
    /// Current lifecycle state
    pub status: GatePassStatus,
    /// When the pass was created
    pub issued_at: DateTime<Utc>,
    /// Who approved the pass
    pub approved_by: Option<ActorId>,
    /// When the pass was approved
    pub approved_at: Option<DateTime<Utc>>,
    /// End of the approval window
    pub approval_expires_at: Option<DateTime<Utc>>,
    /// When the last pickup completed the pass
    pub completed_at: Option<DateTime<Utc>>,
    /// When the pass was expired
    pub expired_at: Option<DateTime<Utc>>,
}

impl GatePass {
    /// Creates a pending pass.
    #[must_use]
    pub const fn pending(
        id: GatePassId,
        lot_id: LotId,
        location: LocationKey,
        requester: ActorId,
        issued_by: ActorId,
        requested_quantity: Quantity,
        issued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            lot_id,
            location,
            requester,
            issued_by,
            requested_quantity,
            approved_quantity: None,
            total_picked_up: Quantity::ZERO,
            final_approved_quantity: None,
            pickup_count: 0,
            status: GatePassStatus::Pending,
            issued_at,
            approved_by: None,
            approved_at: None,
            approval_expires_at: None,
            completed_at: None,
            expired_at: None,
        }
    }

    /// Whether pickups are allowed at `now`: the pass is active and
    /// `now < approval_expires_at`.
    ///
    /// Derived from the timestamp on every call, so a lapsed window is closed
    /// even before the scanner has expired the pass.
    #[must_use]
    pub fn window_open(&self, now: DateTime<Utc>) -> bool {
        self.status.is_active() && self.approval_expires_at.is_some_and(|expires| now < expires)
    }

    /// Whether the pass is active with its window closed at `now`, and so
    /// due to be expired. Exactly the complement of [`GatePass::window_open`]
    /// among approved passes.
    #[must_use]
    pub fn is_expirable(&self, now: DateTime<Utc>) -> bool {
        self.status.is_active() && self.approval_expires_at.is_some_and(|expires| expires <= now)
    }

    /// Approved quantity not yet picked up.
    #[must_use]
    pub fn remaining(&self) -> Quantity {
        self.approved_quantity
            .unwrap_or(Quantity::ZERO)
            .saturating_sub(self.total_picked_up)
    }

    /// Stock this pass still holds a claim on at `now`.
    ///
    /// Only passes whose window is open commit stock; pending passes and
    /// lapsed windows commit nothing.
    #[must_use]
    pub fn outstanding_commitment(&self, now: DateTime<Utc>) -> Quantity {
        if self.window_open(now) {
            self.remaining()
        } else {
            Quantity::ZERO
        }
    }

    /// Checks the record-level invariants.
    ///
    /// # Errors
    ///
    /// Returns a description of the first violated invariant.
    pub fn check_invariants(&self) -> Result<(), String> {
        match (self.status, self.approved_quantity) {
            (GatePassStatus::Pending, Some(_)) => {
                return Err("pending pass carries an approved quantity".to_string());
            }
            (GatePassStatus::Pending, None) => {}
            (status, None) => {
                return Err(format!("{status} pass has no approved quantity"));
            }
            (_, Some(approved)) => {
                if self.total_picked_up > approved {
                    return Err(format!(
                        "picked up {} exceeds approved {approved}",
                        self.total_picked_up
                    ));
                }
            }
        }

        let expired = self.status == GatePassStatus::Expired;
        if expired != self.final_approved_quantity.is_some() {
            return Err("final approved quantity must be set exactly when expired".to_string());
        }

        if self.status == GatePassStatus::Completed
            && self.approved_quantity != Some(self.total_picked_up)
        {
            return Err("completed pass has unpicked quantity".to_string());
        }

        Ok(())
    }
}
