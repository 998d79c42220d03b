//! The gate pass engine: the imperative shell around the state machine.
//!
//! Each operation reads the records it needs, runs the pure reducer, and
//! commits the result with optimistic concurrency. Conflicts and storage
//! timeouts re-run the cycle with backoff; business-rule rejections are
//! returned as is.

use crate::audit::AuditTrail;
use crate::ledger::{InventoryLedger, stock_in_write};
use crate::metrics::EngineMetrics;
use crate::notify::NotifierChain;
use crate::recorder::{PickupRecorder, RecordedPickup};
use crate::retry::{RetryPolicy, retry_transient};
use crate::scanner::{self, SweepReport};
use crate::storage::{ReadVersions, Storage, commit_for};
use crate::EngineConfig;
use gatepass_core::audit::AuditEntry;
use gatepass_core::environment::Clock;
use gatepass_core::error::GatePassError;
use gatepass_core::gate_pass::{GatePass, GatePassStatus};
use gatepass_core::lot::Lot;
use gatepass_core::machine::{
    GatePassAction, GatePassEnvironment, GatePassEvent, GatePassReducer, GatePassState,
};
use gatepass_core::notify::{Notification, NotificationKind, Notifier};
use gatepass_core::pickup::PickupEvent;
use gatepass_core::reducer::{Events, Reducer};
use gatepass_core::store::{Commit, RecordStore};
use gatepass_core::types::{Actor, ActorId, CustomerId, GatePassId, LocationKey, LotId, Quantity};
use gatepass_core::version::Versioned;
use gatepass_core::{DateTime, Utc};
use std::sync::Arc;

/// Result of [`GatePassEngine::expire`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExpireOutcome {
    /// The pass was expired by this call.
    Expired(GatePass),
    /// Nothing to do: the pass is pending, terminal, or its window is open.
    Unchanged(GatePass),
}

impl ExpireOutcome {
    /// The pass after the call.
    #[must_use]
    pub const fn pass(&self) -> &GatePass {
        match self {
            Self::Expired(pass) | Self::Unchanged(pass) => pass,
        }
    }

    /// Unwrap the pass.
    #[must_use]
    pub fn into_pass(self) -> GatePass {
        match self {
            Self::Expired(pass) | Self::Unchanged(pass) => pass,
        }
    }

    /// Whether this call expired the pass.
    #[must_use]
    pub const fn is_expired(&self) -> bool {
        matches!(self, Self::Expired(_))
    }
}

/// Gate pass lifecycle engine.
///
/// Cheap to clone; clones share the store, clock and notifiers.
///
/// # Example
///
/// ```ignore
/// let engine = GatePassEngine::new(store, Arc::new(SystemClock), EngineConfig::default());
/// let lot = engine.register_lot(customer, "bay-1".into(), "rice".into(), Quantity::new(150)).await?;
/// let pass = engine.create(lot.id, requester, clerk, Quantity::new(150)).await?;
/// let pass = engine.approve(pass.id, Quantity::new(150), manager).await?;
/// engine.record_pickup(pass.id, Quantity::new(100), guard, vec![]).await?;
/// ```
#[derive(Clone)]
pub struct GatePassEngine {
    storage: Storage,
    environment: GatePassEnvironment,
    reducer: GatePassReducer,
    retry: RetryPolicy,
    recorder: PickupRecorder,
    ledger: InventoryLedger,
    audit: AuditTrail,
    notifiers: NotifierChain,
}

impl GatePassEngine {
    /// Creates an engine over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>, config: EngineConfig) -> Self {
        let storage = Storage::new(store, config.storage_timeout);
        let environment = GatePassEnvironment::new(Arc::clone(&clock), config.approval_window);

        Self {
            recorder: PickupRecorder::new(
                storage.clone(),
                environment.clone(),
                config.retry.clone(),
            ),
            ledger: InventoryLedger::new(storage.clone(), clock, config.retry.clone()),
            audit: AuditTrail::new(storage.clone()),
            storage,
            environment,
            reducer: GatePassReducer::new(),
            retry: config.retry,
            notifiers: NotifierChain::default(),
        }
    }

    /// Notify requesters through `notifiers`, tried in order.
    #[must_use]
    pub fn with_notifiers(mut self, notifiers: Vec<Arc<dyn Notifier>>) -> Self {
        self.notifiers = NotifierChain::new(notifiers);
        self
    }

    /// The inventory ledger.
    #[must_use]
    pub const fn ledger(&self) -> &InventoryLedger {
        &self.ledger
    }

    /// The audit trail.
    #[must_use]
    pub const fn audit(&self) -> &AuditTrail {
        &self.audit
    }

    /// The pickup recorder.
    #[must_use]
    pub const fn recorder(&self) -> &PickupRecorder {
        &self.recorder
    }

    pub(crate) const fn storage(&self) -> &Storage {
        &self.storage
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.environment.clock.now()
    }

    /// Take in a lot and credit its location (creating the counter on first
    /// stock-in), atomically.
    ///
    /// # Errors
    ///
    /// Returns [`GatePassError::InvalidQuantity`] for zero or counter
    /// overflow, or a storage error.
    pub async fn register_lot(
        &self,
        customer_id: CustomerId,
        location: LocationKey,
        description: String,
        quantity: Quantity,
    ) -> Result<Lot, GatePassError> {
        if quantity.is_zero() {
            return Err(GatePassError::invalid_quantity(
                "received quantity must be greater than zero",
            ));
        }

        let lot = Lot::new(
            LotId::new(),
            customer_id,
            location,
            description,
            quantity,
            self.now(),
        );

        let lot_ref = &lot;
        let total = retry_transient(&self.retry, "register_lot", || async move {
            let lot = lot_ref;
            let existing = self.storage.load_counter(&lot.location).await?;
            let (write, total) = stock_in_write(existing, &lot.location, quantity, self.now())?;
            self.storage
                .commit(Commit {
                    lot: Some(lot.clone()),
                    counters: vec![write],
                    ..Commit::default()
                })
                .await?;
            Ok(total)
        })
        .await?;

        tracing::info!(
            lot_id = %lot.id,
            location = %lot.location,
            %quantity,
            location_total = %total,
            "Lot registered"
        );
        Ok(lot)
    }

    /// Create a pending pass against a lot.
    ///
    /// # Errors
    ///
    /// Returns [`GatePassError::InvalidQuantity`] if `requested_quantity` is
    /// zero or exceeds what the lot has left (or the location's uncommitted
    /// stock, if lower),
    /// [`GatePassError::LotNotFound`], or a storage error.
    pub async fn create(
        &self,
        lot_id: LotId,
        requester: ActorId,
        issued_by: ActorId,
        requested_quantity: Quantity,
    ) -> Result<GatePass, GatePassError> {
        let pass_id = GatePassId::new();
        let actor = &Actor::User(issued_by.clone());
        let (requester, issued_by) = (&requester, &issued_by);

        let result = retry_transient(&self.retry, "create", || async move {
            let lot = self.storage.load_lot(lot_id).await?;
            let mut state = GatePassState {
                lot,
                ..GatePassState::default()
            };
            let mut versions = ReadVersions::default();
            if let Some(lot) = &state.lot {
                let counter = self.storage.load_counter(&lot.location).await?;
                versions.counter = counter.as_ref().map(|counter| counter.version);
                state.counter = counter.map(Versioned::into_record);
                state.committed = self
                    .storage
                    .committed_at(&lot.location, None, self.now())
                    .await?;
                state.lot_drawn = self.storage.drawn_from_lot(lot.id, None, self.now()).await?;
            }

            let action = GatePassAction::Create {
                pass_id,
                lot_id,
                requester: requester.clone(),
                issued_by: issued_by.clone(),
                requested_quantity,
            };
            self.apply(state, versions, action, actor).await
        })
        .await;

        let (pass, _) = Self::observe("create", result)?;
        tracing::info!(
            pass_id = %pass.id,
            %lot_id,
            requested = %requested_quantity,
            "Gate pass created"
        );
        Ok(pass)
    }

    /// Approve a pending pass and start its approval window.
    ///
    /// # Errors
    ///
    /// Returns [`GatePassError::InvalidState`] unless the pass is pending,
    /// [`GatePassError::InvalidQuantity`] unless
    /// `0 < approved_quantity <= min(requested, available)`,
    /// [`GatePassError::PassNotFound`], or a storage error.
    pub async fn approve(
        &self,
        pass_id: GatePassId,
        approved_quantity: Quantity,
        approver: ActorId,
    ) -> Result<GatePass, GatePassError> {
        let actor = &Actor::User(approver.clone());
        let approver = &approver;

        let result = retry_transient(&self.retry, "approve", || async move {
            let stored = self.storage.load_pass(pass_id).await?;
            let location = stored.record.location.clone();
            let counter = self.storage.load_counter(&location).await?;
            let committed = self
                .storage
                .committed_at(&location, Some(pass_id), self.now())
                .await?;
            let lot = self.storage.load_lot(stored.record.lot_id).await?;
            let lot_drawn = self
                .storage
                .drawn_from_lot(stored.record.lot_id, Some(pass_id), self.now())
                .await?;

            let versions = ReadVersions {
                pass: Some(stored.version),
                counter: counter.as_ref().map(|counter| counter.version),
                lock_counter: true,
            };
            let state = GatePassState {
                pass: Some(stored.record),
                lot,
                counter: counter.map(Versioned::into_record),
                committed,
                lot_drawn,
            };

            let action = GatePassAction::Approve {
                pass_id,
                approved_quantity,
                approver: approver.clone(),
            };
            self.apply(state, versions, action, actor).await
        })
        .await;

        let (pass, _) = Self::observe("approve", result)?;
        tracing::info!(
            %pass_id,
            approved = %approved_quantity,
            expires_at = ?pass.approval_expires_at,
            "Gate pass approved"
        );
        self.notify(&pass, NotificationKind::Approved);
        Ok(pass)
    }

    /// Record a pickup against an active pass.
    ///
    /// # Errors
    ///
    /// See [`PickupRecorder::record`].
    pub async fn record_pickup(
        &self,
        pass_id: GatePassId,
        quantity: Quantity,
        actor: ActorId,
        location_tags: Vec<String>,
    ) -> Result<RecordedPickup, GatePassError> {
        let result = self
            .recorder
            .record(pass_id, quantity, actor, location_tags)
            .await;

        let (recorded, _) = Self::observe("record_pickup", result)?;
        if recorded.completed() {
            tracing::info!(
                %pass_id,
                total = %recorded.pass.total_picked_up,
                "Gate pass completed"
            );
            self.notify(&recorded.pass, NotificationKind::Completed);
        }
        Ok(recorded)
    }

    /// Expire the pass if its window has lapsed. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`GatePassError::PassNotFound`] or a storage error.
    pub async fn expire(&self, pass_id: GatePassId) -> Result<ExpireOutcome, GatePassError> {
        let result = retry_transient(&self.retry, "expire", || async move {
            let stored = self.storage.load_pass(pass_id).await?;
            let versions = ReadVersions {
                pass: Some(stored.version),
                ..ReadVersions::default()
            };
            let state = GatePassState::for_pass(stored.record);
            self.apply(state, versions, GatePassAction::Expire { pass_id }, &Actor::System)
                .await
        })
        .await;

        let (pass, events) = Self::observe("expire", result)?;
        if events.is_empty() {
            return Ok(ExpireOutcome::Unchanged(pass));
        }

        tracing::info!(
            %pass_id,
            final_quantity = ?pass.final_approved_quantity,
            "Gate pass expired"
        );
        self.notify(&pass, NotificationKind::Expired);
        Ok(ExpireOutcome::Expired(pass))
    }

    /// Fetch a pass, expiring it first if its window has closed.
    ///
    /// # Errors
    ///
    /// Returns [`GatePassError::PassNotFound`] or a storage error, including
    /// a failure to expire a lapsed pass; a lapsed pass is never returned as
    /// active.
    pub async fn get(&self, pass_id: GatePassId) -> Result<GatePass, GatePassError> {
        let pass = self.storage.load_pass(pass_id).await?.into_record();
        if pass.is_expirable(self.now()) {
            return Ok(self.expire(pass_id).await?.into_pass());
        }
        Ok(pass)
    }

    /// All passes in `status`, oldest first.
    ///
    /// Listing approved, partially completed or expired passes runs an
    /// expiration sweep first, so lapsed passes are reported as expired. An
    /// active pass whose window has closed but which the sweep failed to
    /// expire is left out of the listing; the next sweep retries it.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub async fn list_by_state(
        &self,
        status: GatePassStatus,
    ) -> Result<Vec<GatePass>, GatePassError> {
        if status.is_active() || status == GatePassStatus::Expired {
            self.sweep().await?;
        }
        let mut passes = self
            .storage
            .call(self.storage.store().list_passes_by_status(status))
            .await?;

        if status.is_active() {
            let now = self.now();
            passes.retain(|pass| {
                let open = pass.window_open(now);
                if !open {
                    tracing::debug!(pass_id = %pass.id, "Withholding lapsed pass from active listing");
                }
                open
            });
        }
        Ok(passes)
    }

    /// Pickup events of a pass in acceptance order.
    ///
    /// # Errors
    ///
    /// Returns [`GatePassError::PassNotFound`] or a storage error.
    pub async fn list_pickups(&self, pass_id: GatePassId) -> Result<Vec<PickupEvent>, GatePassError> {
        self.storage.load_pass(pass_id).await?;
        self.storage
            .call(self.storage.store().list_pickups(pass_id))
            .await
    }

    /// Audit entries of a pass, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub async fn audit_by_pass(&self, pass_id: GatePassId) -> Result<Vec<AuditEntry>, GatePassError> {
        self.audit.by_pass(pass_id).await
    }

    /// Audit entries recorded in `[from, to)`.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub async fn audit_in_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<AuditEntry>, GatePassError> {
        self.audit.in_range(from, to).await
    }

    /// Expire every pass whose window has lapsed.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the due passes cannot be listed; failures
    /// on individual passes are counted in the report instead.
    pub async fn sweep(&self) -> Result<SweepReport, GatePassError> {
        scanner::sweep(self).await
    }

    /// Run the reducer and commit its result.
    ///
    /// Returns the pass as committed and the events. No events means nothing
    /// was written.
    async fn apply(
        &self,
        mut state: GatePassState,
        versions: ReadVersions,
        action: GatePassAction,
        actor: &Actor,
    ) -> Result<(GatePass, Events<GatePassEvent>), GatePassError> {
        let pass_id = action.pass_id();
        let events = self.reducer.reduce(&mut state, action, &self.environment)?;

        if !events.is_empty() {
            self.storage
                .commit(commit_for(&state, versions, &events, actor))
                .await?;
        }

        let pass = state.pass.ok_or(GatePassError::PassNotFound(pass_id))?;
        Ok((pass, events))
    }

    /// Record metrics and log the outcome of an operation.
    fn observe<T>(
        operation: &'static str,
        result: Result<(T, Events<GatePassEvent>), GatePassError>,
    ) -> Result<(T, Events<GatePassEvent>), GatePassError> {
        match &result {
            Ok((_, events)) => EngineMetrics::record_events(events),
            Err(error) if error.is_rejection() => {
                EngineMetrics::record_rejection(error);
                tracing::debug!(operation, error = %error, "Gate pass operation rejected");
            }
            Err(error) => {
                EngineMetrics::record_rejection(error);
                tracing::error!(operation, error = %error, "Gate pass operation failed");
            }
        }
        result
    }

    fn notify(&self, pass: &GatePass, kind: NotificationKind) {
        let message = match kind {
            NotificationKind::Approved => format!(
                "Gate pass {} approved for {} units, valid until {}",
                pass.id,
                pass.approved_quantity.unwrap_or(Quantity::ZERO),
                pass.approval_expires_at
                    .map_or_else(|| "-".to_string(), |at| at.to_rfc3339()),
            ),
            NotificationKind::Completed => format!(
                "Gate pass {} completed: {} units picked up",
                pass.id, pass.total_picked_up
            ),
            NotificationKind::Expired => format!(
                "Gate pass {} expired: {} of {} units picked up",
                pass.id,
                pass.total_picked_up,
                pass.approved_quantity.unwrap_or(Quantity::ZERO),
            ),
        };

        self.notifiers.dispatch(Notification {
            pass_id: pass.id,
            recipient: pass.requester.clone(),
            kind,
            message,
        });
    }
}
