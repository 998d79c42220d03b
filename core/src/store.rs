//! Record store trait for gate pass persistence.
//!
//! The store holds five kinds of records: lots, gate passes, location
//! counters, pickup events and audit entries. Gate passes and counters are
//! mutable and versioned; pickups and audit entries are append-only.
//!
//! Every state-changing operation is persisted as one [`Commit`]: the store
//! checks the expected version of each mutable record and writes everything,
//! or nothing. A version mismatch surfaces as [`StoreError::Conflict`], which
//! the runtime retries after reloading.
//!
//! # Implementations
//!
//! - `PostgresRecordStore` (in `gatepass-postgres`): production storage
//! - `InMemoryRecordStore` (in `gatepass-testing`): fast, deterministic tests
//!   with fault injection

use crate::audit::AuditEntry;
use crate::gate_pass::{GatePass, GatePassStatus};
use crate::ledger::LocationCounter;
use crate::lot::Lot;
use crate::pickup::PickupEvent;
use crate::types::{GatePassId, LocationKey, LotId};
use crate::version::{Version, Versioned};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by [`RecordStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Errors that can occur during record store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Optimistic concurrency conflict: the record is no longer at the
    /// expected version (or, for inserts, already exists).
    #[error("Concurrency conflict on {entity} {key}: expected version {expected}")]
    Conflict {
        /// Record kind (`gate_pass`, `location_counter`, ...)
        entity: String,
        /// Record key
        key: String,
        /// The version the writer read
        expected: Version,
    },

    /// Database connection or query error.
    #[error("Database error: {0}")]
    Database(String),

    /// A stored row could not be decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Shorthand for a conflict on a gate pass row.
    #[must_use]
    pub fn pass_conflict(id: GatePassId, expected: Version) -> Self {
        Self::Conflict {
            entity: "gate_pass".to_string(),
            key: id.to_string(),
            expected,
        }
    }

    /// Shorthand for a conflict on a location counter row.
    #[must_use]
    pub fn counter_conflict(location: &LocationKey, expected: Version) -> Self {
        Self::Conflict {
            entity: "location_counter".to_string(),
            key: location.to_string(),
            expected,
        }
    }
}

/// Write of a versioned gate pass row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PassWrite {
    /// Insert a new pass at version 1; conflicts if the id exists.
    Insert(GatePass),
    /// Replace the pass if it is still at `expected`.
    Update {
        /// New row contents
        pass: GatePass,
        /// Version the writer read
        expected: Version,
    },
}

impl PassWrite {
    /// The row being written.
    #[must_use]
    pub const fn pass(&self) -> &GatePass {
        match self {
            Self::Insert(pass) | Self::Update { pass, .. } => pass,
        }
    }
}

/// Write of a versioned location counter row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CounterWrite {
    /// Insert a new counter at version 1; conflicts if the location exists.
    Insert(LocationCounter),
    /// Replace the counter if it is still at `expected`.
    Update {
        /// New row contents
        counter: LocationCounter,
        /// Version the writer read
        expected: Version,
    },
}

impl CounterWrite {
    /// The row being written.
    #[must_use]
    pub const fn counter(&self) -> &LocationCounter {
        match self {
            Self::Insert(counter) | Self::Update { counter, .. } => counter,
        }
    }
}

/// Everything one operation writes, applied atomically.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Commit {
    /// Lot to insert (lot registration only)
    pub lot: Option<Lot>,
    /// Gate pass row write
    pub pass: Option<PassWrite>,
    /// Location counter writes
    pub counters: Vec<CounterWrite>,
    /// Pickup events to append
    pub pickups: Vec<PickupEvent>,
    /// Audit entries to append
    pub audit: Vec<AuditEntry>,
}

impl Commit {
    /// Whether the commit writes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lot.is_none()
            && self.pass.is_none()
            && self.counters.is_empty()
            && self.pickups.is_empty()
            && self.audit.is_empty()
    }
}

/// Persistence for gate passes and everything they touch.
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn`
/// so the engine can hold an `Arc<dyn RecordStore>`.
///
/// Lookups return `Ok(None)` for missing records; callers map that to the
/// appropriate not-found error.
pub trait RecordStore: Send + Sync {
    /// Load a lot.
    ///
    /// # Errors
    ///
    /// Returns error if the database query fails.
    fn load_lot(&self, id: LotId) -> StoreFuture<'_, Option<Lot>>;

    /// Load a gate pass with its current version.
    ///
    /// # Errors
    ///
    /// Returns error if the database query fails.
    fn load_pass(&self, id: GatePassId) -> StoreFuture<'_, Option<Versioned<GatePass>>>;

    /// Load a location counter with its current version.
    ///
    /// # Errors
    ///
    /// Returns error if the database query fails.
    fn load_counter(
        &self,
        location: LocationKey,
    ) -> StoreFuture<'_, Option<Versioned<LocationCounter>>>;

    /// All passes whose lot is stored at `location`.
    ///
    /// # Errors
    ///
    /// Returns error if the database query fails.
    fn list_passes_by_location(&self, location: LocationKey) -> StoreFuture<'_, Vec<GatePass>>;

    /// All passes drawn against `lot_id`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns error if the database query fails.
    fn list_passes_by_lot(&self, lot_id: LotId) -> StoreFuture<'_, Vec<GatePass>>;

    /// All passes in `status`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns error if the database query fails.
    fn list_passes_by_status(&self, status: GatePassStatus) -> StoreFuture<'_, Vec<GatePass>>;

    /// Ids of active passes whose window ended before `now`.
    ///
    /// # Errors
    ///
    /// Returns error if the database query fails.
    fn list_expirable(&self, now: DateTime<Utc>) -> StoreFuture<'_, Vec<GatePassId>>;

    /// Pickup events of a pass in sequence order.
    ///
    /// # Errors
    ///
    /// Returns error if the database query fails.
    fn list_pickups(&self, pass_id: GatePassId) -> StoreFuture<'_, Vec<PickupEvent>>;

    /// Audit entries of a pass in insertion order.
    ///
    /// # Errors
    ///
    /// Returns error if the database query fails.
    fn list_audit_by_pass(&self, pass_id: GatePassId) -> StoreFuture<'_, Vec<AuditEntry>>;

    /// Audit entries recorded in `[from, to)`, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns error if the database query fails.
    fn list_audit_in_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreFuture<'_, Vec<AuditEntry>>;

    /// Apply a commit atomically.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] if any versioned record moved on since
    /// it was read (nothing is written), or a database error.
    fn commit(&self, commit: Commit) -> StoreFuture<'_, ()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_names_the_record() {
        let location = LocationKey::new("bay-9");
        let error = StoreError::counter_conflict(&location, Version::new(4));
        assert_eq!(
            error.to_string(),
            "Concurrency conflict on location_counter bay-9: expected version 4"
        );
    }

    #[test]
    fn default_commit_is_empty() {
        assert!(Commit::default().is_empty());
    }
}
