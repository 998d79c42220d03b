//! Conversions between domain records and table rows.

use chrono::{DateTime, Utc};
use gatepass_core::audit::{AuditEntry, TransitionKind};
use gatepass_core::gate_pass::{GatePass, GatePassStatus};
use gatepass_core::ledger::LocationCounter;
use gatepass_core::lot::Lot;
use gatepass_core::pickup::PickupEvent;
use gatepass_core::store::StoreError;
use gatepass_core::types::{
    Actor, ActorId, AuditId, CustomerId, GatePassId, LocationKey, LotId, PickupId, Quantity,
};
use gatepass_core::version::{Version, Versioned};
use sqlx::Row;
use sqlx::postgres::PgRow;
use uuid::Uuid;

pub(crate) const PASS_COLUMNS: &str = "id, lot_id, location, requester, issued_by, \
     requested_quantity, approved_quantity, total_picked_up, final_approved_quantity, \
     pickup_count, status, issued_at, approved_by, approved_at, approval_expires_at, \
     completed_at, expired_at, version";

pub(crate) const AUDIT_COLUMNS: &str = "id, pass_id, kind, actor, status_before, status_after, \
     quantity_before, quantity_after, recorded_at";

pub(crate) fn database(error: sqlx::Error) -> StoreError {
    StoreError::Database(error.to_string())
}

fn decode(error: sqlx::Error) -> StoreError {
    StoreError::Serialization(error.to_string())
}

fn invalid(column: &str, reason: impl std::fmt::Display) -> StoreError {
    StoreError::Serialization(format!("invalid {column}: {reason}"))
}

pub(crate) fn quantity_to_db(quantity: Quantity) -> Result<i64, StoreError> {
    i64::try_from(quantity.units()).map_err(|_| invalid("quantity", quantity))
}

pub(crate) fn optional_quantity_to_db(
    quantity: Option<Quantity>,
) -> Result<Option<i64>, StoreError> {
    quantity.map(quantity_to_db).transpose()
}

pub(crate) fn version_to_db(version: Version) -> Result<i64, StoreError> {
    i64::try_from(version.value()).map_err(|_| invalid("version", version))
}

pub(crate) fn count_to_db(count: u32) -> Result<i32, StoreError> {
    i32::try_from(count).map_err(|_| invalid("count", count))
}

fn quantity(row: &PgRow, column: &str) -> Result<Quantity, StoreError> {
    let units: i64 = row.try_get(column).map_err(decode)?;
    u64::try_from(units)
        .map(Quantity::new)
        .map_err(|_| invalid(column, units))
}

fn optional_quantity(row: &PgRow, column: &str) -> Result<Option<Quantity>, StoreError> {
    let units: Option<i64> = row.try_get(column).map_err(decode)?;
    units
        .map(|units| {
            u64::try_from(units)
                .map(Quantity::new)
                .map_err(|_| invalid(column, units))
        })
        .transpose()
}

fn version(row: &PgRow) -> Result<Version, StoreError> {
    let value: i64 = row.try_get("version").map_err(decode)?;
    u64::try_from(value)
        .map(Version::new)
        .map_err(|_| invalid("version", value))
}

fn count(row: &PgRow, column: &str) -> Result<u32, StoreError> {
    let value: i32 = row.try_get(column).map_err(decode)?;
    u32::try_from(value).map_err(|_| invalid(column, value))
}

fn actor_id(row: &PgRow, column: &str) -> Result<ActorId, StoreError> {
    let id: String = row.try_get(column).map_err(decode)?;
    id.parse().map_err(|e| invalid(column, e))
}

fn actor(row: &PgRow, column: &str) -> Result<Actor, StoreError> {
    let tag: String = row.try_get(column).map_err(decode)?;
    Actor::from_tag(&tag).map_err(|e| invalid(column, e))
}

fn status(row: &PgRow, column: &str) -> Result<GatePassStatus, StoreError> {
    let value: String = row.try_get(column).map_err(decode)?;
    GatePassStatus::parse(&value).map_err(|e| invalid(column, e))
}

fn uuid(row: &PgRow, column: &str) -> Result<Uuid, StoreError> {
    row.try_get(column).map_err(decode)
}

fn timestamp(row: &PgRow, column: &str) -> Result<DateTime<Utc>, StoreError> {
    row.try_get(column).map_err(decode)
}

fn optional_timestamp(row: &PgRow, column: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
    row.try_get(column).map_err(decode)
}

pub(crate) fn lot_from_row(row: &PgRow) -> Result<Lot, StoreError> {
    Ok(Lot {
        id: LotId::from_uuid(uuid(row, "id")?),
        customer_id: CustomerId::from_uuid(uuid(row, "customer_id")?),
        location: LocationKey::new(row.try_get::<String, _>("location").map_err(decode)?),
        description: row.try_get("description").map_err(decode)?,
        received_quantity: quantity(row, "received_quantity")?,
        received_at: timestamp(row, "received_at")?,
    })
}

pub(crate) fn pass_from_row(row: &PgRow) -> Result<Versioned<GatePass>, StoreError> {
    let approved_by: Option<String> = row.try_get("approved_by").map_err(decode)?;
    let approved_by = approved_by
        .map(|id| id.parse::<ActorId>().map_err(|e| invalid("approved_by", e)))
        .transpose()?;

    let pass = GatePass {
        id: GatePassId::from_uuid(uuid(row, "id")?),
        lot_id: LotId::from_uuid(uuid(row, "lot_id")?),
        location: LocationKey::new(row.try_get::<String, _>("location").map_err(decode)?),
        requester: actor_id(row, "requester")?,
        issued_by: actor_id(row, "issued_by")?,
        requested_quantity: quantity(row, "requested_quantity")?,
        approved_quantity: optional_quantity(row, "approved_quantity")?,
        total_picked_up: quantity(row, "total_picked_up")?,
        final_approved_quantity: optional_quantity(row, "final_approved_quantity")?,
        pickup_count: count(row, "pickup_count")?,
        status: status(row, "status")?,
        issued_at: timestamp(row, "issued_at")?,
        approved_by,
        approved_at: optional_timestamp(row, "approved_at")?,
        approval_expires_at: optional_timestamp(row, "approval_expires_at")?,
        completed_at: optional_timestamp(row, "completed_at")?,
        expired_at: optional_timestamp(row, "expired_at")?,
    };
    Ok(Versioned::new(pass, version(row)?))
}

pub(crate) fn counter_from_row(row: &PgRow) -> Result<Versioned<LocationCounter>, StoreError> {
    let counter = LocationCounter {
        location: LocationKey::new(row.try_get::<String, _>("location").map_err(decode)?),
        quantity: quantity(row, "quantity")?,
        updated_at: timestamp(row, "updated_at")?,
    };
    Ok(Versioned::new(counter, version(row)?))
}

pub(crate) fn pickup_from_row(row: &PgRow) -> Result<PickupEvent, StoreError> {
    Ok(PickupEvent {
        id: PickupId::from_uuid(uuid(row, "id")?),
        pass_id: GatePassId::from_uuid(uuid(row, "pass_id")?),
        sequence: count(row, "sequence")?,
        quantity: quantity(row, "quantity")?,
        location: LocationKey::new(row.try_get::<String, _>("location").map_err(decode)?),
        location_tags: row.try_get("location_tags").map_err(decode)?,
        actor: actor_id(row, "actor")?,
        recorded_at: timestamp(row, "recorded_at")?,
    })
}

pub(crate) fn audit_from_row(row: &PgRow) -> Result<AuditEntry, StoreError> {
    let kind: String = row.try_get("kind").map_err(decode)?;
    let status_before: Option<String> = row.try_get("status_before").map_err(decode)?;

    Ok(AuditEntry {
        id: AuditId::from_uuid(uuid(row, "id")?),
        pass_id: GatePassId::from_uuid(uuid(row, "pass_id")?),
        kind: TransitionKind::parse(&kind).map_err(|e| invalid("kind", e))?,
        actor: actor(row, "actor")?,
        status_before: status_before
            .map(|value| GatePassStatus::parse(&value).map_err(|e| invalid("status_before", e)))
            .transpose()?,
        status_after: status(row, "status_after")?,
        quantity_before: optional_quantity(row, "quantity_before")?,
        quantity_after: quantity(row, "quantity_after")?,
        recorded_at: timestamp(row, "recorded_at")?,
    })
}
