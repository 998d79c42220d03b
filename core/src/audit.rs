//! Audit trail entries.
//!
//! Every create, approve, pickup and expire transition produces exactly one
//! [`AuditEntry`], written in the same atomic commit as the transition itself.
//! Entries are never updated or deleted.

use crate::gate_pass::GatePassStatus;
use crate::machine::GatePassEvent;
use crate::types::{Actor, AuditId, GatePassId, Quantity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Kind of transition an audit entry records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransitionKind {
    /// Pass created (pending)
    Created,
    /// Pass approved, window started
    Approved,
    /// Pickup accepted (the entry's `status_after` shows whether it completed the pass)
    PickupRecorded,
    /// Window lapsed, pass expired
    Expired,
}

/// Error returned when parsing an unknown transition kind.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid transition kind: {0}")]
pub struct ParseTransitionKindError(String);

impl TransitionKind {
    /// Convert to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Approved => "approved",
            Self::PickupRecorded => "pickup_recorded",
            Self::Expired => "expired",
        }
    }

    /// Parse from database string.
    ///
    /// # Errors
    ///
    /// Returns error if the string doesn't match a known kind.
    pub fn parse(s: &str) -> Result<Self, ParseTransitionKindError> {
        match s {
            "created" => Ok(Self::Created),
            "approved" => Ok(Self::Approved),
            "pickup_recorded" => Ok(Self::PickupRecorded),
            "expired" => Ok(Self::Expired),
            _ => Err(ParseTransitionKindError(s.to_string())),
        }
    }
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable audit record.
///
/// Quantity columns depend on the kind:
///
/// | kind | before | after |
/// |---|---|---|
/// | `created` | none | requested |
/// | `approved` | requested | approved |
/// | `pickup_recorded` | total picked up before | total picked up after |
/// | `expired` | approved | final approved (= picked up) |
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Entry identifier
    pub id: AuditId,
    /// Pass the transition belongs to
    pub pass_id: GatePassId,
    /// What happened
    pub kind: TransitionKind,
    /// Who did it
    pub actor: Actor,
    /// State before the transition (`None` for creation)
    pub status_before: Option<GatePassStatus>,
    /// State after the transition
    pub status_after: GatePassStatus,
    /// Quantity before (see table above)
    pub quantity_before: Option<Quantity>,
    /// Quantity after (see table above)
    pub quantity_after: Quantity,
    /// When it happened
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    /// Builds the audit entry for a state machine event.
    ///
    /// Returns `None` for events that are not pass transitions in their own
    /// right (inventory deductions, and completion, which the pickup entry
    /// already records through its `status_after`).
    #[must_use]
    pub fn for_event(event: &GatePassEvent, actor: &Actor) -> Option<Self> {
        let entry = match event {
            GatePassEvent::PassCreated { pass } => Self {
                id: AuditId::new(),
                pass_id: pass.id,
                kind: TransitionKind::Created,
                actor: actor.clone(),
                status_before: None,
                status_after: GatePassStatus::Pending,
                quantity_before: None,
                quantity_after: pass.requested_quantity,
                recorded_at: pass.issued_at,
            },
            GatePassEvent::PassApproved {
                pass_id,
                requested_quantity,
                approved_quantity,
                approved_at,
                ..
            } => Self {
                id: AuditId::new(),
                pass_id: *pass_id,
                kind: TransitionKind::Approved,
                actor: actor.clone(),
                status_before: Some(GatePassStatus::Pending),
                status_after: GatePassStatus::Approved,
                quantity_before: Some(*requested_quantity),
                quantity_after: *approved_quantity,
                recorded_at: *approved_at,
            },
            GatePassEvent::PickupRecorded {
                pickup,
                total_before,
                total_after,
                status_before,
                status_after,
            } => Self {
                id: AuditId::new(),
                pass_id: pickup.pass_id,
                kind: TransitionKind::PickupRecorded,
                actor: actor.clone(),
                status_before: Some(*status_before),
                status_after: *status_after,
                quantity_before: Some(*total_before),
                quantity_after: *total_after,
                recorded_at: pickup.recorded_at,
            },
            GatePassEvent::PassExpired {
                pass_id,
                status_before,
                approved_quantity,
                final_approved_quantity,
                expired_at,
            } => Self {
                id: AuditId::new(),
                pass_id: *pass_id,
                kind: TransitionKind::Expired,
                actor: actor.clone(),
                status_before: Some(*status_before),
                status_after: GatePassStatus::Expired,
                quantity_before: Some(*approved_quantity),
                quantity_after: *final_approved_quantity,
                recorded_at: *expired_at,
            },
            GatePassEvent::InventoryDeducted { .. } | GatePassEvent::PassCompleted { .. } => {
                return None;
            }
        };
        Some(entry)
    }
}
