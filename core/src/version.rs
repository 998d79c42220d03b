//! Record versions for optimistic concurrency control.
//!
//! Every mutable record in the store (gate passes, location counters) carries a
//! [`Version`]. A writer states the version it read; the store rejects the write
//! with [`StoreError::Conflict`](crate::store::StoreError::Conflict) when the
//! row moved on in the meantime. This is how the engine serializes all
//! state-changing operations per pass and per location without an in-process
//! lock.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Version number of a stored record.
///
/// Newly inserted records are at version 1; every successful update bumps the
/// version by one. [`Version::INITIAL`] (0) means "not stored yet".
///
/// # Examples
///
/// ```
/// use gatepass_core::version::Version;
///
/// let v0 = Version::INITIAL;
/// let v1 = v0.next();
/// assert_eq!(v1, Version::new(1));
/// assert!(v0.is_initial());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version(u64);

impl Version {
    /// The version of a record that has never been written.
    pub const INITIAL: Self = Self(0);

    /// Create a new `Version` with the given value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the version number.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Get the next version (current + 1).
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Check if this is the initial version (0).
    #[must_use]
    pub const fn is_initial(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Version {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Version> for u64 {
    fn from(version: Version) -> Self {
        version.0
    }
}

/// A record together with the version it was read at.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Versioned<T> {
    /// The record as read from the store.
    pub record: T,
    /// The version the record was read at.
    pub version: Version,
}

impl<T> Versioned<T> {
    /// Pair a record with its version.
    #[must_use]
    pub const fn new(record: T, version: Version) -> Self {
        Self { record, version }
    }

    /// Discard the version.
    #[must_use]
    pub fn into_record(self) -> T {
        self.record
    }

    /// Map the record, keeping the version.
    #[must_use]
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Versioned<U> {
        Versioned {
            record: f(self.record),
            version: self.version,
        }
    }
}
