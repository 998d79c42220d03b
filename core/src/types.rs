//! Identifier and quantity types shared by every gate pass component.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            #[doc = concat!("Creates a new random `", stringify!($name), "`")]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            #[doc = concat!("Creates a `", stringify!($name), "` from a UUID")]
            #[must_use]
            pub const fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Returns the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a gate pass
    GatePassId
);
uuid_id!(
    /// Unique identifier for a lot of stored goods
    LotId
);
uuid_id!(
    /// Unique identifier for a single pickup event
    PickupId
);
uuid_id!(
    /// Unique identifier for an audit trail entry
    AuditId
);
uuid_id!(
    /// Unique identifier for the customer owning a lot
    CustomerId
);

/// Error returned when parsing an empty identifier or key.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} must not be empty")]
pub struct EmptyKeyError {
    kind: &'static str,
}

/// Authenticated identity of whoever invoked an operation.
///
/// The surrounding web layer authenticates callers; the core only records the
/// identity it is handed.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorId(String);

impl ActorId {
    /// Create an actor id from trusted input.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ActorId {
    type Err = EmptyKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err(EmptyKeyError { kind: "actor id" });
        }
        Ok(Self(s.to_string()))
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Key of a physical storage location holding an inventory counter.
///
/// # Examples
///
/// ```
/// use gatepass_core::types::LocationKey;
///
/// let key: LocationKey = "warehouse-a/bay-7".parse().unwrap();
/// assert_eq!(key.as_str(), "warehouse-a/bay-7");
/// assert!("".parse::<LocationKey>().is_err());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LocationKey(String);

impl LocationKey {
    /// Create a location key from trusted input (no validation).
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for LocationKey {
    type Err = EmptyKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err(EmptyKeyError { kind: "location key" });
        }
        Ok(Self(s.to_string()))
    }
}

impl fmt::Display for LocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LocationKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A whole-unit quantity of goods.
///
/// All arithmetic is checked; the engine never wraps or clamps a quantity.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Quantity(u64);

impl Quantity {
    /// Zero units.
    pub const ZERO: Self = Self(0);

    /// Creates a quantity of `units`.
    #[must_use]
    pub const fn new(units: u64) -> Self {
        Self(units)
    }

    /// Number of units.
    #[must_use]
    pub const fn units(self) -> u64 {
        self.0
    }

    /// Checks if this quantity is zero.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Addition, `None` on overflow.
    #[must_use]
    pub const fn checked_add(self, rhs: Self) -> Option<Self> {
        match self.0.checked_add(rhs.0) {
            Some(units) => Some(Self(units)),
            None => None,
        }
    }

    /// Subtraction, `None` when `rhs` exceeds `self`.
    #[must_use]
    pub const fn checked_sub(self, rhs: Self) -> Option<Self> {
        match self.0.checked_sub(rhs.0) {
            Some(units) => Some(Self(units)),
            None => None,
        }
    }

    /// Subtraction floored at zero.
    #[must_use]
    pub const fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Quantity {
    fn from(units: u64) -> Self {
        Self(units)
    }
}

impl std::iter::Sum for Quantity {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        Self(iter.map(|q| q.0).sum())
    }
}

/// Who performed a transition, as recorded in the audit trail.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Actor {
    /// An authenticated caller.
    User(ActorId),
    /// The engine itself (expiration).
    System,
}

impl Actor {
    /// Database/string representation: `user:<id>` or `system`.
    #[must_use]
    pub fn to_tag(&self) -> String {
        match self {
            Self::User(id) => format!("user:{id}"),
            Self::System => "system".to_string(),
        }
    }

    /// Parse the representation produced by [`Actor::to_tag`].
    ///
    /// # Errors
    ///
    /// Returns [`EmptyKeyError`] if the tag names a user with an empty id.
    pub fn from_tag(tag: &str) -> Result<Self, EmptyKeyError> {
        match tag.strip_prefix("user:") {
            Some(id) => Ok(Self::User(id.parse()?)),
            None if tag == "system" => Ok(Self::System),
            None => Ok(Self::User(tag.parse()?)),
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_tag())
    }
}

impl From<ActorId> for Actor {
    fn from(id: ActorId) -> Self {
        Self::User(id)
    }
}
