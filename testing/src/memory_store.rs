//! In-memory record store for tests.
//!
//! Behaves like the Postgres store (version checks, all-or-nothing commits,
//! query ordering) and adds fault injection so tests can exercise conflict
//! retries, storage deadlines and scanner failure isolation.

use chrono::{DateTime, Utc};
use gatepass_core::audit::AuditEntry;
use gatepass_core::gate_pass::{GatePass, GatePassStatus};
use gatepass_core::ledger::LocationCounter;
use gatepass_core::lot::Lot;
use gatepass_core::pickup::PickupEvent;
use gatepass_core::store::{Commit, CounterWrite, PassWrite, RecordStore, StoreError, StoreFuture};
use gatepass_core::types::{GatePassId, LocationKey, LotId};
use gatepass_core::version::{Version, Versioned};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Default)]
struct Records {
    lots: HashMap<LotId, Lot>,
    passes: HashMap<GatePassId, Versioned<GatePass>>,
    counters: HashMap<LocationKey, Versioned<LocationCounter>>,
    pickups: HashMap<GatePassId, Vec<PickupEvent>>,
    audit: Vec<AuditEntry>,
}

#[derive(Debug, Default)]
struct Faults {
    failing_commits: Vec<StoreError>,
    poisoned_passes: HashSet<GatePassId>,
    delay: Option<Duration>,
    commits: usize,
    rejected_commits: usize,
}

/// Record store backed by hash maps.
///
/// # Example
///
/// ```
/// use gatepass_testing::InMemoryRecordStore;
/// use gatepass_core::store::StoreError;
///
/// let store = InMemoryRecordStore::new();
/// store.fail_next_commits(vec![StoreError::Database("disk full".to_string())]);
/// assert_eq!(store.commit_count(), 0);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: Mutex<Records>,
    faults: Mutex<Faults>,
}

impl InMemoryRecordStore {
    /// Creates an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> MutexGuard<'_, Records> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn faults(&self) -> MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The next commits fail with these errors, in order, without writing.
    pub fn fail_next_commits(&self, errors: Vec<StoreError>) {
        let mut faults = self.faults();
        faults.failing_commits = errors;
        faults.failing_commits.reverse();
    }

    /// Every commit that writes this pass fails with a database error.
    pub fn poison_pass(&self, pass_id: GatePassId) {
        self.faults().poisoned_passes.insert(pass_id);
    }

    /// Every storage call sleeps this long before touching the records.
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.faults().delay = delay;
    }

    /// Number of commits applied.
    #[must_use]
    pub fn commit_count(&self) -> usize {
        self.faults().commits
    }

    /// Number of commits rejected (conflicts and injected faults).
    #[must_use]
    pub fn rejected_commit_count(&self) -> usize {
        self.faults().rejected_commits
    }

    /// Overwrite a counter outside of any pass operation (ledger corrections
    /// in tests), bumping its version.
    pub fn force_counter(&self, counter: LocationCounter) {
        let mut records = self.records();
        let version = records
            .counters
            .get(&counter.location)
            .map_or(Version::INITIAL, |current| current.version)
            .next();
        records
            .counters
            .insert(counter.location.clone(), Versioned::new(counter, version));
    }

    /// Every pickup event in the store.
    #[must_use]
    pub fn all_pickups(&self) -> Vec<PickupEvent> {
        self.records().pickups.values().flatten().cloned().collect()
    }

    async fn pause(&self) {
        let delay = self.faults().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn check(records: &Records, commit: &Commit) -> Result<(), StoreError> {
        if let Some(lot) = &commit.lot {
            if records.lots.contains_key(&lot.id) {
                return Err(StoreError::Conflict {
                    entity: "lot".to_string(),
                    key: lot.id.to_string(),
                    expected: Version::INITIAL,
                });
            }
        }

        match &commit.pass {
            Some(PassWrite::Insert(pass)) if records.passes.contains_key(&pass.id) => {
                return Err(StoreError::pass_conflict(pass.id, Version::INITIAL));
            }
            Some(PassWrite::Update { pass, expected }) => {
                let current = records.passes.get(&pass.id).map(|stored| stored.version);
                if current != Some(*expected) {
                    return Err(StoreError::pass_conflict(pass.id, *expected));
                }
            }
            _ => {}
        }

        for write in &commit.counters {
            let current = records
                .counters
                .get(&write.counter().location)
                .map(|stored| stored.version);
            let expected = match write {
                CounterWrite::Insert(_) => None,
                CounterWrite::Update { expected, .. } => Some(*expected),
            };
            if current != expected {
                return Err(StoreError::counter_conflict(
                    &write.counter().location,
                    expected.unwrap_or(Version::INITIAL),
                ));
            }
        }

        for pickup in &commit.pickups {
            let duplicate = records
                .pickups
                .get(&pickup.pass_id)
                .is_some_and(|existing| existing.iter().any(|p| p.sequence == pickup.sequence));
            if duplicate {
                return Err(StoreError::Conflict {
                    entity: "pickup_event".to_string(),
                    key: format!("{}#{}", pickup.pass_id, pickup.sequence),
                    expected: Version::INITIAL,
                });
            }
        }

        Ok(())
    }

    fn apply(records: &mut Records, commit: Commit) {
        if let Some(lot) = commit.lot {
            records.lots.insert(lot.id, lot);
        }

        match commit.pass {
            Some(PassWrite::Insert(pass)) => {
                records
                    .passes
                    .insert(pass.id, Versioned::new(pass, Version::INITIAL.next()));
            }
            Some(PassWrite::Update { pass, expected }) => {
                records.passes.insert(pass.id, Versioned::new(pass, expected.next()));
            }
            None => {}
        }

        for write in commit.counters {
            let (counter, version) = match write {
                CounterWrite::Insert(counter) => (counter, Version::INITIAL.next()),
                CounterWrite::Update { counter, expected } => (counter, expected.next()),
            };
            records
                .counters
                .insert(counter.location.clone(), Versioned::new(counter, version));
        }

        for pickup in commit.pickups {
            records.pickups.entry(pickup.pass_id).or_default().push(pickup);
        }

        records.audit.extend(commit.audit);
    }
}

impl RecordStore for InMemoryRecordStore {
    fn load_lot(&self, id: LotId) -> StoreFuture<'_, Option<Lot>> {
        Box::pin(async move {
            self.pause().await;
            Ok(self.records().lots.get(&id).cloned())
        })
    }

    fn load_pass(&self, id: GatePassId) -> StoreFuture<'_, Option<Versioned<GatePass>>> {
        Box::pin(async move {
            self.pause().await;
            Ok(self.records().passes.get(&id).cloned())
        })
    }

    fn load_counter(
        &self,
        location: LocationKey,
    ) -> StoreFuture<'_, Option<Versioned<LocationCounter>>> {
        Box::pin(async move {
            self.pause().await;
            Ok(self.records().counters.get(&location).cloned())
        })
    }

    fn list_passes_by_location(&self, location: LocationKey) -> StoreFuture<'_, Vec<GatePass>> {
        Box::pin(async move {
            self.pause().await;
            let mut passes: Vec<GatePass> = self
                .records()
                .passes
                .values()
                .filter(|stored| stored.record.location == location)
                .map(|stored| stored.record.clone())
                .collect();
            passes.sort_by_key(|pass| (pass.issued_at, pass.id));
            Ok(passes)
        })
    }

    fn list_passes_by_lot(&self, lot_id: LotId) -> StoreFuture<'_, Vec<GatePass>> {
        Box::pin(async move {
            self.pause().await;
            let mut passes: Vec<GatePass> = self
                .records()
                .passes
                .values()
                .filter(|stored| stored.record.lot_id == lot_id)
                .map(|stored| stored.record.clone())
                .collect();
            passes.sort_by_key(|pass| (pass.issued_at, pass.id));
            Ok(passes)
        })
    }

    fn list_passes_by_status(&self, status: GatePassStatus) -> StoreFuture<'_, Vec<GatePass>> {
        Box::pin(async move {
            self.pause().await;
            let mut passes: Vec<GatePass> = self
                .records()
                .passes
                .values()
                .filter(|stored| stored.record.status == status)
                .map(|stored| stored.record.clone())
                .collect();
            passes.sort_by_key(|pass| (pass.issued_at, pass.id));
            Ok(passes)
        })
    }

    fn list_expirable(&self, now: DateTime<Utc>) -> StoreFuture<'_, Vec<GatePassId>> {
        Box::pin(async move {
            self.pause().await;
            let mut due: Vec<(DateTime<Utc>, GatePassId)> = self
                .records()
                .passes
                .values()
                .filter(|stored| stored.record.is_expirable(now))
                .filter_map(|stored| {
                    stored
                        .record
                        .approval_expires_at
                        .map(|expires| (expires, stored.record.id))
                })
                .collect();
            due.sort();
            Ok(due.into_iter().map(|(_, id)| id).collect())
        })
    }

    fn list_pickups(&self, pass_id: GatePassId) -> StoreFuture<'_, Vec<PickupEvent>> {
        Box::pin(async move {
            self.pause().await;
            let mut pickups = self
                .records()
                .pickups
                .get(&pass_id)
                .cloned()
                .unwrap_or_default();
            pickups.sort_by_key(|pickup| pickup.sequence);
            Ok(pickups)
        })
    }

    fn list_audit_by_pass(&self, pass_id: GatePassId) -> StoreFuture<'_, Vec<AuditEntry>> {
        Box::pin(async move {
            self.pause().await;
            Ok(self
                .records()
                .audit
                .iter()
                .filter(|entry| entry.pass_id == pass_id)
                .cloned()
                .collect())
        })
    }

    fn list_audit_in_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreFuture<'_, Vec<AuditEntry>> {
        Box::pin(async move {
            self.pause().await;
            Ok(self
                .records()
                .audit
                .iter()
                .filter(|entry| entry.recorded_at >= from && entry.recorded_at < to)
                .cloned()
                .collect())
        })
    }

    fn commit(&self, commit: Commit) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.pause().await;

            {
                let mut faults = self.faults();
                let poisoned = commit
                    .pass
                    .as_ref()
                    .is_some_and(|write| faults.poisoned_passes.contains(&write.pass().id));
                if poisoned {
                    faults.rejected_commits += 1;
                    return Err(StoreError::Database("injected failure".to_string()));
                }
                if let Some(error) = faults.failing_commits.pop() {
                    faults.rejected_commits += 1;
                    return Err(error);
                }
            }

            let mut records = self.records();
            if let Err(error) = Self::check(&records, &commit) {
                drop(records);
                self.faults().rejected_commits += 1;
                return Err(error);
            }
            Self::apply(&mut records, commit);
            drop(records);

            self.faults().commits += 1;
            Ok(())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use gatepass_core::types::{ActorId, Quantity};

    fn pass(location: &str) -> GatePass {
        GatePass::pending(
            GatePassId::new(),
            LotId::new(),
            LocationKey::new(location),
            ActorId::new("driver"),
            ActorId::new("clerk"),
            Quantity::new(10),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn insert_then_update_bumps_version() {
        let store = InMemoryRecordStore::new();
        let mut record = pass("bay-1");
        store
            .commit(Commit {
                pass: Some(PassWrite::Insert(record.clone())),
                ..Commit::default()
            })
            .await
            .unwrap();

        let loaded = store.load_pass(record.id).await.unwrap().unwrap();
        assert_eq!(loaded.version, Version::new(1));

        record.pickup_count = 1;
        store
            .commit(Commit {
                pass: Some(PassWrite::Update {
                    pass: record.clone(),
                    expected: Version::new(1),
                }),
                ..Commit::default()
            })
            .await
            .unwrap();
        let loaded = store.load_pass(record.id).await.unwrap().unwrap();
        assert_eq!(loaded.version, Version::new(2));
        assert_eq!(loaded.record.pickup_count, 1);
    }

    #[tokio::test]
    async fn stale_update_writes_nothing() {
        let store = InMemoryRecordStore::new();
        let record = pass("bay-1");
        store
            .commit(Commit {
                pass: Some(PassWrite::Insert(record.clone())),
                ..Commit::default()
            })
            .await
            .unwrap();

        let counter = LocationCounter::empty(LocationKey::new("bay-1"), Utc::now());
        let result = store
            .commit(Commit {
                pass: Some(PassWrite::Update {
                    pass: record.clone(),
                    expected: Version::new(7),
                }),
                counters: vec![CounterWrite::Insert(counter)],
                ..Commit::default()
            })
            .await;

        assert!(matches!(result, Err(StoreError::Conflict { .. })));
        assert!(
            store
                .load_counter(LocationKey::new("bay-1"))
                .await
                .unwrap()
                .is_none()
        );
        assert_eq!(store.rejected_commit_count(), 1);
    }

    #[tokio::test]
    async fn injected_failures_are_consumed_in_order() {
        let store = InMemoryRecordStore::new();
        store.fail_next_commits(vec![
            StoreError::Database("first".to_string()),
            StoreError::Database("second".to_string()),
        ]);

        let first = store.commit(Commit::default()).await;
        let second = store.commit(Commit::default()).await;
        let third = store.commit(Commit::default()).await;

        assert_eq!(first, Err(StoreError::Database("first".to_string())));
        assert_eq!(second, Err(StoreError::Database("second".to_string())));
        assert_eq!(third, Ok(()));
    }
}
