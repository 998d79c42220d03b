//! `PostgreSQL` record store for the gate pass engine.
//!
//! Implements [`RecordStore`] on top of sqlx. Every [`Commit`] runs in a
//! single transaction; versioned rows are updated with
//! `WHERE version = $expected`, so a stale write touches no rows and the
//! transaction is rolled back with [`StoreError::Conflict`].
//!
//! # Example
//!
//! ```ignore
//! use gatepass_postgres::PostgresRecordStore;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PostgresRecordStore::new("postgres://localhost/gatepass").await?;
//!     store.migrate().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod rows;

use chrono::{DateTime, Utc};
use gatepass_core::audit::AuditEntry;
use gatepass_core::gate_pass::{GatePass, GatePassStatus};
use gatepass_core::ledger::LocationCounter;
use gatepass_core::lot::Lot;
use gatepass_core::pickup::PickupEvent;
use gatepass_core::store::{Commit, CounterWrite, PassWrite, RecordStore, StoreError, StoreFuture};
use gatepass_core::types::{GatePassId, LocationKey, LotId};
use gatepass_core::version::{Version, Versioned};
use rows::{
    AUDIT_COLUMNS, PASS_COLUMNS, count_to_db, database, optional_quantity_to_db, quantity_to_db,
    version_to_db,
};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::{PgPool, Postgres, Transaction};

type PgQuery<'q> = sqlx::query::Query<'q, Postgres, PgArguments>;

/// `PostgreSQL`-backed [`RecordStore`].
#[derive(Clone, Debug)]
pub struct PostgresRecordStore {
    pool: PgPool,
}

impl PostgresRecordStore {
    /// Connect to `database_url`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the connection fails.
    pub async fn new(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url).await.map_err(database)?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the bundled schema migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    async fn fetch_passes(
        &self,
        filter: &str,
        bind: impl FnOnce(PgQuery<'_>) -> PgQuery<'_>,
    ) -> Result<Vec<GatePass>, StoreError> {
        let sql = format!(
            "SELECT {PASS_COLUMNS} FROM gate_passes WHERE {filter} ORDER BY issued_at ASC, id ASC"
        );
        let found = bind(sqlx::query(&sql))
            .fetch_all(&self.pool)
            .await
            .map_err(database)?;

        found
            .iter()
            .map(|row| rows::pass_from_row(row).map(Versioned::into_record))
            .collect()
    }

    async fn fetch_audit(
        &self,
        filter: &str,
        bind: impl FnOnce(PgQuery<'_>) -> PgQuery<'_>,
    ) -> Result<Vec<AuditEntry>, StoreError> {
        let sql = format!("SELECT {AUDIT_COLUMNS} FROM audit_entries WHERE {filter} ORDER BY seq ASC");
        let found: Vec<PgRow> = bind(sqlx::query(&sql))
            .fetch_all(&self.pool)
            .await
            .map_err(database)?;

        found.iter().map(rows::audit_from_row).collect()
    }

    async fn apply(&self, commit: Commit) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(database)?;

        if let Some(lot) = &commit.lot {
            insert_lot(&mut tx, lot).await?;
        }
        match &commit.pass {
            Some(PassWrite::Insert(pass)) => insert_pass(&mut tx, pass).await?,
            Some(PassWrite::Update { pass, expected }) => {
                update_pass(&mut tx, pass, *expected).await?;
            }
            None => {}
        }
        for write in &commit.counters {
            match write {
                CounterWrite::Insert(counter) => insert_counter(&mut tx, counter).await?,
                CounterWrite::Update { counter, expected } => {
                    update_counter(&mut tx, counter, *expected).await?;
                }
            }
        }
        for pickup in &commit.pickups {
            insert_pickup(&mut tx, pickup).await?;
        }
        for entry in &commit.audit {
            insert_audit(&mut tx, entry).await?;
        }

        tx.commit().await.map_err(database)
    }
}

/// Maps a unique violation to `conflict`, anything else to a database error.
fn insert_error(error: sqlx::Error, conflict: StoreError) -> StoreError {
    match &error {
        sqlx::Error::Database(db) if db.is_unique_violation() => conflict,
        _ => database(error),
    }
}

async fn insert_lot(tx: &mut Transaction<'_, Postgres>, lot: &Lot) -> Result<(), StoreError> {
    sqlx::query(
        r"
        INSERT INTO lots (id, customer_id, location, description, received_quantity, received_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        ",
    )
    .bind(lot.id.as_uuid())
    .bind(lot.customer_id.as_uuid())
    .bind(lot.location.as_str())
    .bind(&lot.description)
    .bind(quantity_to_db(lot.received_quantity)?)
    .bind(lot.received_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| {
        insert_error(
            e,
            StoreError::Conflict {
                entity: "lot".to_string(),
                key: lot.id.to_string(),
                expected: Version::INITIAL,
            },
        )
    })?;
    Ok(())
}

async fn insert_pass(tx: &mut Transaction<'_, Postgres>, pass: &GatePass) -> Result<(), StoreError> {
    sqlx::query(
        r"
        INSERT INTO gate_passes (
            id, lot_id, location, requester, issued_by,
            requested_quantity, approved_quantity, total_picked_up, final_approved_quantity,
            pickup_count, status, issued_at, approved_by, approved_at, approval_expires_at,
            completed_at, expired_at, version
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
        ",
    )
    .bind(pass.id.as_uuid())
    .bind(pass.lot_id.as_uuid())
    .bind(pass.location.as_str())
    .bind(pass.requester.as_str())
    .bind(pass.issued_by.as_str())
    .bind(quantity_to_db(pass.requested_quantity)?)
    .bind(optional_quantity_to_db(pass.approved_quantity)?)
    .bind(quantity_to_db(pass.total_picked_up)?)
    .bind(optional_quantity_to_db(pass.final_approved_quantity)?)
    .bind(count_to_db(pass.pickup_count)?)
    .bind(pass.status.as_str())
    .bind(pass.issued_at)
    .bind(pass.approved_by.as_ref().map(|id| id.as_str().to_string()))
    .bind(pass.approved_at)
    .bind(pass.approval_expires_at)
    .bind(pass.completed_at)
    .bind(pass.expired_at)
    .bind(version_to_db(Version::INITIAL.next())?)
    .execute(&mut **tx)
    .await
    .map_err(|e| insert_error(e, StoreError::pass_conflict(pass.id, Version::INITIAL)))?;
    Ok(())
}

async fn update_pass(
    tx: &mut Transaction<'_, Postgres>,
    pass: &GatePass,
    expected: Version,
) -> Result<(), StoreError> {
    let result = sqlx::query(
        r"
        UPDATE gate_passes
        SET approved_quantity = $3,
            total_picked_up = $4,
            final_approved_quantity = $5,
            pickup_count = $6,
            status = $7,
            approved_by = $8,
            approved_at = $9,
            approval_expires_at = $10,
            completed_at = $11,
            expired_at = $12,
            version = $13
        WHERE id = $1 AND version = $2
        ",
    )
    .bind(pass.id.as_uuid())
    .bind(version_to_db(expected)?)
    .bind(optional_quantity_to_db(pass.approved_quantity)?)
    .bind(quantity_to_db(pass.total_picked_up)?)
    .bind(optional_quantity_to_db(pass.final_approved_quantity)?)
    .bind(count_to_db(pass.pickup_count)?)
    .bind(pass.status.as_str())
    .bind(pass.approved_by.as_ref().map(|id| id.as_str().to_string()))
    .bind(pass.approved_at)
    .bind(pass.approval_expires_at)
    .bind(pass.completed_at)
    .bind(pass.expired_at)
    .bind(version_to_db(expected.next())?)
    .execute(&mut **tx)
    .await
    .map_err(database)?;

    if result.rows_affected() == 0 {
        return Err(StoreError::pass_conflict(pass.id, expected));
    }
    Ok(())
}

async fn insert_counter(
    tx: &mut Transaction<'_, Postgres>,
    counter: &LocationCounter,
) -> Result<(), StoreError> {
    sqlx::query(
        r"
        INSERT INTO location_counters (location, quantity, updated_at, version)
        VALUES ($1, $2, $3, $4)
        ",
    )
    .bind(counter.location.as_str())
    .bind(quantity_to_db(counter.quantity)?)
    .bind(counter.updated_at)
    .bind(version_to_db(Version::INITIAL.next())?)
    .execute(&mut **tx)
    .await
    .map_err(|e| {
        insert_error(
            e,
            StoreError::counter_conflict(&counter.location, Version::INITIAL),
        )
    })?;
    Ok(())
}

async fn update_counter(
    tx: &mut Transaction<'_, Postgres>,
    counter: &LocationCounter,
    expected: Version,
) -> Result<(), StoreError> {
    let result = sqlx::query(
        r"
        UPDATE location_counters
        SET quantity = $3, updated_at = $4, version = $5
        WHERE location = $1 AND version = $2
        ",
    )
    .bind(counter.location.as_str())
    .bind(version_to_db(expected)?)
    .bind(quantity_to_db(counter.quantity)?)
    .bind(counter.updated_at)
    .bind(version_to_db(expected.next())?)
    .execute(&mut **tx)
    .await
    .map_err(database)?;

    if result.rows_affected() == 0 {
        return Err(StoreError::counter_conflict(&counter.location, expected));
    }
    Ok(())
}

async fn insert_pickup(
    tx: &mut Transaction<'_, Postgres>,
    pickup: &PickupEvent,
) -> Result<(), StoreError> {
    sqlx::query(
        r"
        INSERT INTO pickup_events (
            id, pass_id, sequence, quantity, location, location_tags, actor, recorded_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ",
    )
    .bind(pickup.id.as_uuid())
    .bind(pickup.pass_id.as_uuid())
    .bind(count_to_db(pickup.sequence)?)
    .bind(quantity_to_db(pickup.quantity)?)
    .bind(pickup.location.as_str())
    .bind(&pickup.location_tags)
    .bind(pickup.actor.as_str())
    .bind(pickup.recorded_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| {
        insert_error(
            e,
            StoreError::Conflict {
                entity: "pickup_event".to_string(),
                key: format!("{}#{}", pickup.pass_id, pickup.sequence),
                expected: Version::INITIAL,
            },
        )
    })?;
    Ok(())
}

async fn insert_audit(
    tx: &mut Transaction<'_, Postgres>,
    entry: &AuditEntry,
) -> Result<(), StoreError> {
    sqlx::query(
        r"
        INSERT INTO audit_entries (
            id, pass_id, kind, actor, status_before, status_after,
            quantity_before, quantity_after, recorded_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ",
    )
    .bind(entry.id.as_uuid())
    .bind(entry.pass_id.as_uuid())
    .bind(entry.kind.as_str())
    .bind(entry.actor.to_tag())
    .bind(entry.status_before.map(|status| status.as_str()))
    .bind(entry.status_after.as_str())
    .bind(optional_quantity_to_db(entry.quantity_before)?)
    .bind(quantity_to_db(entry.quantity_after)?)
    .bind(entry.recorded_at)
    .execute(&mut **tx)
    .await
    .map_err(database)?;
    Ok(())
}

impl RecordStore for PostgresRecordStore {
    fn load_lot(&self, id: LotId) -> StoreFuture<'_, Option<Lot>> {
        Box::pin(async move {
            let row = sqlx::query(
                r"
                SELECT id, customer_id, location, description, received_quantity, received_at
                FROM lots
                WHERE id = $1
                ",
            )
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(database)?;

            row.as_ref().map(rows::lot_from_row).transpose()
        })
    }

    fn load_pass(&self, id: GatePassId) -> StoreFuture<'_, Option<Versioned<GatePass>>> {
        Box::pin(async move {
            let sql = format!("SELECT {PASS_COLUMNS} FROM gate_passes WHERE id = $1");
            let row = sqlx::query(&sql)
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(database)?;

            row.as_ref().map(rows::pass_from_row).transpose()
        })
    }

    fn load_counter(
        &self,
        location: LocationKey,
    ) -> StoreFuture<'_, Option<Versioned<LocationCounter>>> {
        Box::pin(async move {
            let row = sqlx::query(
                r"
                SELECT location, quantity, updated_at, version
                FROM location_counters
                WHERE location = $1
                ",
            )
            .bind(location.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(database)?;

            row.as_ref().map(rows::counter_from_row).transpose()
        })
    }

    fn list_passes_by_location(&self, location: LocationKey) -> StoreFuture<'_, Vec<GatePass>> {
        Box::pin(async move {
            self.fetch_passes("location = $1", |query| {
                query.bind(location.as_str().to_string())
            })
            .await
        })
    }

    fn list_passes_by_lot(&self, lot_id: LotId) -> StoreFuture<'_, Vec<GatePass>> {
        Box::pin(async move {
            self.fetch_passes("lot_id = $1", |query| query.bind(*lot_id.as_uuid()))
                .await
        })
    }

    fn list_passes_by_status(&self, status: GatePassStatus) -> StoreFuture<'_, Vec<GatePass>> {
        Box::pin(async move {
            self.fetch_passes("status = $1", |query| query.bind(status.as_str()))
                .await
        })
    }

    fn list_expirable(&self, now: DateTime<Utc>) -> StoreFuture<'_, Vec<GatePassId>> {
        Box::pin(async move {
            let ids: Vec<(uuid::Uuid,)> = sqlx::query_as(
                r"
                SELECT id
                FROM gate_passes
                WHERE status IN ('approved', 'partially_completed')
                  AND approval_expires_at <= $1
                ORDER BY approval_expires_at ASC, id ASC
                ",
            )
            .bind(now)
            .fetch_all(&self.pool)
            .await
            .map_err(database)?;

            Ok(ids.into_iter().map(|(id,)| GatePassId::from_uuid(id)).collect())
        })
    }

    fn list_pickups(&self, pass_id: GatePassId) -> StoreFuture<'_, Vec<PickupEvent>> {
        Box::pin(async move {
            let found = sqlx::query(
                r"
                SELECT id, pass_id, sequence, quantity, location, location_tags, actor, recorded_at
                FROM pickup_events
                WHERE pass_id = $1
                ORDER BY sequence ASC
                ",
            )
            .bind(pass_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(database)?;

            found.iter().map(rows::pickup_from_row).collect()
        })
    }

    fn list_audit_by_pass(&self, pass_id: GatePassId) -> StoreFuture<'_, Vec<AuditEntry>> {
        Box::pin(async move {
            self.fetch_audit("pass_id = $1", |query| query.bind(*pass_id.as_uuid()))
                .await
        })
    }

    fn list_audit_in_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreFuture<'_, Vec<AuditEntry>> {
        Box::pin(async move {
            self.fetch_audit("recorded_at >= $1 AND recorded_at < $2", |query| {
                query.bind(from).bind(to)
            })
            .await
        })
    }

    fn commit(&self, commit: Commit) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            if commit.is_empty() {
                return Ok(());
            }
            let result = self.apply(commit).await;
            if let Err(StoreError::Conflict { entity, key, .. }) = &result {
                tracing::debug!(%entity, %key, "Commit rolled back on version conflict");
                metrics::counter!("gatepass_store_conflicts_total", "entity" => entity.clone())
                    .increment(1);
            }
            result
        })
    }
}
