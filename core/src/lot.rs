//! Lots: bulk goods taken in at a location.

use crate::types::{CustomerId, LocationKey, LotId, Quantity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A bulk quantity of goods stored at one location.
///
/// The lot's quantity on hand lives in the location's
/// [`LocationCounter`](crate::ledger::LocationCounter); the lot only records
/// what was received.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lot {
    /// Lot identifier
    pub id: LotId,
    /// Owner of the goods
    pub customer_id: CustomerId,
    /// Where the goods are stored
    pub location: LocationKey,
    /// Free-form description of the goods
    pub description: String,
    /// Quantity received at intake
    pub received_quantity: Quantity,
    /// When the lot was received
    pub received_at: DateTime<Utc>,
}

impl Lot {
    /// Creates a new lot record.
    #[must_use]
    pub const fn new(
        id: LotId,
        customer_id: CustomerId,
        location: LocationKey,
        description: String,
        received_quantity: Quantity,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            customer_id,
            location,
            description,
            received_quantity,
            received_at,
        }
    }
}
