//! Inventory ledger: per-location stock counters.
//!
//! Every mutation is a versioned read-modify-write of one counter row, so
//! mutations are linearizable per location. The pickup path deducts through
//! the pickup recorder's commit instead; the operations here serve intake and
//! manual corrections.

use crate::retry::{RetryPolicy, retry_transient};
use crate::storage::Storage;
use gatepass_core::environment::Clock;
use gatepass_core::error::GatePassError;
use gatepass_core::ledger::LocationCounter;
use gatepass_core::store::{Commit, CounterWrite};
use gatepass_core::types::{LocationKey, Quantity};
use gatepass_core::version::Versioned;
use gatepass_core::{DateTime, Utc};
use std::sync::Arc;

/// Per-location stock counters.
#[derive(Clone)]
pub struct InventoryLedger {
    storage: Storage,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl InventoryLedger {
    pub(crate) fn new(storage: Storage, clock: Arc<dyn Clock>, retry: RetryPolicy) -> Self {
        Self {
            storage,
            clock,
            retry,
        }
    }

    /// Units on hand at `location`.
    ///
    /// # Errors
    ///
    /// Returns [`GatePassError::LocationNotFound`] if the location was never
    /// stocked, or a storage error.
    pub async fn current_quantity(&self, location: &LocationKey) -> Result<Quantity, GatePassError> {
        self.storage
            .load_counter(location)
            .await?
            .map(|stored| stored.record.quantity)
            .ok_or_else(|| GatePassError::LocationNotFound(location.clone()))
    }

    /// Remove `quantity` units (corrections, shrinkage).
    ///
    /// Returns the units left.
    ///
    /// # Errors
    ///
    /// Returns [`GatePassError::InsufficientInventory`] if fewer units are on
    /// hand (nothing changes), [`GatePassError::InvalidQuantity`] for zero,
    /// [`GatePassError::LocationNotFound`], or a storage error.
    pub async fn deduct(
        &self,
        location: &LocationKey,
        quantity: Quantity,
    ) -> Result<Quantity, GatePassError> {
        Self::require_positive(quantity)?;
        let remaining = retry_transient(&self.retry, "ledger_deduct", || {
            self.update(location, move |counter, now| counter.deduct(quantity, now))
        })
        .await?;

        tracing::info!(%location, %quantity, %remaining, "Inventory deducted");
        Ok(remaining)
    }

    /// Add `quantity` units back (corrections and reversals only).
    ///
    /// Returns the new total.
    ///
    /// # Errors
    ///
    /// Returns [`GatePassError::InvalidQuantity`] for zero or overflow,
    /// [`GatePassError::LocationNotFound`], or a storage error.
    pub async fn credit(
        &self,
        location: &LocationKey,
        quantity: Quantity,
    ) -> Result<Quantity, GatePassError> {
        Self::require_positive(quantity)?;
        let total = retry_transient(&self.retry, "ledger_credit", || {
            self.update(location, move |counter, now| counter.credit(quantity, now))
        })
        .await?;

        tracing::info!(%location, %quantity, %total, "Inventory credited");
        Ok(total)
    }

    /// Receive `quantity` units, creating the counter on first stock-in.
    ///
    /// Returns the new total.
    ///
    /// # Errors
    ///
    /// Returns [`GatePassError::InvalidQuantity`] for zero or overflow, or a
    /// storage error.
    pub async fn stock_in(
        &self,
        location: &LocationKey,
        quantity: Quantity,
    ) -> Result<Quantity, GatePassError> {
        Self::require_positive(quantity)?;
        let total = retry_transient(&self.retry, "ledger_stock_in", || async move {
            let existing = self.storage.load_counter(location).await?;
            let (write, total) =
                stock_in_write(existing, location, quantity, self.clock.now())?;
            self.storage
                .commit(Commit {
                    counters: vec![write],
                    ..Commit::default()
                })
                .await?;
            Ok(total)
        })
        .await?;

        tracing::info!(%location, %quantity, %total, "Inventory stocked in");
        Ok(total)
    }

    async fn update<F>(&self, location: &LocationKey, change: F) -> Result<Quantity, GatePassError>
    where
        F: FnOnce(&mut LocationCounter, DateTime<Utc>) -> Result<Quantity, GatePassError>,
    {
        let Versioned {
            record: mut counter,
            version,
        } = self
            .storage
            .load_counter(location)
            .await?
            .ok_or_else(|| GatePassError::LocationNotFound(location.clone()))?;

        let quantity = change(&mut counter, self.clock.now())?;
        self.storage
            .commit(Commit {
                counters: vec![CounterWrite::Update {
                    counter,
                    expected: version,
                }],
                ..Commit::default()
            })
            .await?;
        Ok(quantity)
    }

    fn require_positive(quantity: Quantity) -> Result<(), GatePassError> {
        if quantity.is_zero() {
            return Err(GatePassError::invalid_quantity(
                "ledger quantity must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// The counter write that stocks `quantity` units in at `location`.
pub(crate) fn stock_in_write(
    existing: Option<Versioned<LocationCounter>>,
    location: &LocationKey,
    quantity: Quantity,
    now: DateTime<Utc>,
) -> Result<(CounterWrite, Quantity), GatePassError> {
    match existing {
        Some(Versioned {
            record: mut counter,
            version,
        }) => {
            let total = counter.credit(quantity, now)?;
            Ok((
                CounterWrite::Update {
                    counter,
                    expected: version,
                },
                total,
            ))
        }
        None => {
            let mut counter = LocationCounter::empty(location.clone(), now);
            let total = counter.credit(quantity, now)?;
            Ok((CounterWrite::Insert(counter), total))
        }
    }
}
