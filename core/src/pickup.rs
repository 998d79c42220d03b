//! Pickup events: the append-only record of every withdrawal increment.

use crate::types::{ActorId, GatePassId, LocationKey, PickupId, Quantity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One accepted withdrawal against a gate pass. Never updated or deleted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickupEvent {
    /// Pickup identifier
    pub id: PickupId,
    /// Owning gate pass
    pub pass_id: GatePassId,
    /// 1-based acceptance order within the pass
    pub sequence: u32,
    /// Units withdrawn (always > 0)
    pub quantity: Quantity,
    /// Location the units were deducted from
    pub location: LocationKey,
    /// Free-form location descriptors supplied by the caller (dock, bay, truck)
    pub location_tags: Vec<String>,
    /// Who recorded the pickup
    pub actor: ActorId,
    /// When the pickup was accepted
    pub recorded_at: DateTime<Utc>,
}

/// Sum of pickup quantities.
#[must_use]
pub fn total_quantity<'a>(pickups: impl IntoIterator<Item = &'a PickupEvent>) -> Quantity {
    pickups.into_iter().map(|pickup| pickup.quantity).sum()
}
