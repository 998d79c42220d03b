//! # Gatepass Runtime
//!
//! Async shell around the pure gate pass state machine.
//!
//! The engine reads the records an operation needs from a
//! [`RecordStore`](gatepass_core::store::RecordStore), runs the reducer, and
//! commits the outcome atomically with optimistic concurrency control.
//!
//! ## Core Components
//!
//! - **Engine**: create, approve, record pickups, expire, and query passes
//! - **Pickup recorder**: appends pickups and deducts inventory in one commit
//! - **Inventory ledger**: per-location stock counters
//! - **Expiration scanner**: expires passes whose approval window lapsed
//! - **Notifier chain**: ordered fallback delivery of requester notifications
//!
//! ## Example
//!
//! ```ignore
//! use gatepass_runtime::{EngineConfig, GatePassEngine};
//! use gatepass_core::environment::SystemClock;
//!
//! let engine = GatePassEngine::new(store, Arc::new(SystemClock), EngineConfig::default());
//! let pass = engine.create(lot_id, requester, clerk, Quantity::new(150)).await?;
//! let pass = engine.approve(pass.id, Quantity::new(150), manager).await?;
//! let recorded = engine.record_pickup(pass.id, Quantity::new(100), guard, vec![]).await?;
//! ```

use gatepass_core::machine::DEFAULT_APPROVAL_WINDOW_HOURS;
use std::time::Duration;

/// Audit trail queries
pub mod audit;

/// The gate pass engine
pub mod engine;

/// Per-location inventory counters
pub mod ledger;

/// Prometheus metrics for observability
pub mod metrics;

/// Notifier fallback chain
pub mod notify;

/// Pickup recording
pub mod recorder;

/// Retry logic with exponential backoff
pub mod retry;

/// Background expiration of lapsed passes
pub mod scanner;

mod storage;

pub use audit::AuditTrail;
pub use engine::{ExpireOutcome, GatePassEngine};
pub use ledger::InventoryLedger;
pub use notify::{NotifierChain, TracingNotifier};
pub use recorder::{PickupRecorder, RecordedPickup};
pub use retry::RetryPolicy;
pub use scanner::{ExpirationScanner, SweepReport};

/// Default deadline for a single storage call.
pub const DEFAULT_STORAGE_TIMEOUT: Duration = Duration::from_secs(5);

/// Engine settings.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// How long an approval stays valid
    pub approval_window: chrono::Duration,
    /// Deadline for each storage call
    pub storage_timeout: Duration,
    /// Backoff for conflicts and timeouts
    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            approval_window: chrono::Duration::hours(DEFAULT_APPROVAL_WINDOW_HOURS),
            storage_timeout: DEFAULT_STORAGE_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Set the approval window.
    #[must_use]
    pub const fn with_approval_window(mut self, window: chrono::Duration) -> Self {
        self.approval_window = window;
        self
    }

    /// Set the per-call storage deadline.
    #[must_use]
    pub const fn with_storage_timeout(mut self, timeout: Duration) -> Self {
        self.storage_timeout = timeout;
        self
    }

    /// Set the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}
