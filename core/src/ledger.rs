//! Per-location inventory counters.
//!
//! A counter never goes negative: a deduction that exceeds the stock on hand is
//! rejected with [`GatePassError::InsufficientInventory`], not clamped.

use crate::error::GatePassError;
use crate::types::{LocationKey, Quantity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Quantity currently held at one location.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationCounter {
    /// Location key
    pub location: LocationKey,
    /// Units on hand
    pub quantity: Quantity,
    /// Last change
    pub updated_at: DateTime<Utc>,
}

impl LocationCounter {
    /// Creates an empty counter (first stock-in).
    #[must_use]
    pub const fn empty(location: LocationKey, at: DateTime<Utc>) -> Self {
        Self {
            location,
            quantity: Quantity::ZERO,
            updated_at: at,
        }
    }

    /// Removes `quantity` units.
    ///
    /// # Errors
    ///
    /// Returns [`GatePassError::InsufficientInventory`] if fewer than `quantity`
    /// units are on hand; the counter is left unchanged.
    pub fn deduct(&mut self, quantity: Quantity, at: DateTime<Utc>) -> Result<Quantity, GatePassError> {
        let remaining =
            self.quantity
                .checked_sub(quantity)
                .ok_or_else(|| GatePassError::InsufficientInventory {
                    location: self.location.clone(),
                    requested: quantity,
                    available: self.quantity,
                })?;
        self.quantity = remaining;
        self.updated_at = at;
        Ok(remaining)
    }

    /// Adds `quantity` units.
    ///
    /// # Errors
    ///
    /// Returns [`GatePassError::InvalidQuantity`] if the counter would overflow.
    pub fn credit(&mut self, quantity: Quantity, at: DateTime<Utc>) -> Result<Quantity, GatePassError> {
        let total = self.quantity.checked_add(quantity).ok_or_else(|| {
            GatePassError::invalid_quantity(format!(
                "crediting {quantity} to {} overflows the counter",
                self.location
            ))
        })?;
        self.quantity = total;
        self.updated_at = at;
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter(units: u64) -> LocationCounter {
        let mut counter = LocationCounter::empty(LocationKey::new("bay-3"), Utc::now());
        counter.quantity = Quantity::new(units);
        counter
    }

    #[test]
    fn deduct_to_zero_is_allowed() {
        let mut counter = counter(40);
        assert_eq!(counter.deduct(Quantity::new(40), Utc::now()), Ok(Quantity::ZERO));
        assert_eq!(counter.quantity, Quantity::ZERO);
    }

    #[test]
    fn over_deduction_is_rejected_not_clamped() {
        let mut counter = counter(40);
        let result = counter.deduct(Quantity::new(41), Utc::now());

        assert_eq!(
            result,
            Err(GatePassError::InsufficientInventory {
                location: LocationKey::new("bay-3"),
                requested: Quantity::new(41),
                available: Quantity::new(40),
            })
        );
        assert_eq!(counter.quantity, Quantity::new(40));
    }

    #[test]
    fn credit_overflow_is_rejected() {
        let mut counter = counter(u64::MAX);
        assert!(counter.credit(Quantity::new(1), Utc::now()).is_err());
        assert_eq!(counter.quantity, Quantity::new(u64::MAX));
    }
}
