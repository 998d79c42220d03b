//! # Gatepass Testing
//!
//! Testing utilities for the gate pass engine.
//!
//! This crate provides:
//! - A manually driven clock for deterministic window tests
//! - [`InMemoryRecordStore`], a record store with fault injection
//! - Recording and failing notifiers
//! - A Given-When-Then harness for reducers
//! - proptest strategies for domain values
//!
//! ## Example
//!
//! ```
//! use gatepass_core::environment::Clock;
//! use gatepass_testing::test_clock;
//! use chrono::Duration;
//!
//! let clock = test_clock();
//! let start = clock.now();
//! clock.advance(Duration::hours(15));
//! assert_eq!(clock.now() - start, Duration::hours(15));
//! ```

use chrono::{DateTime, Utc};
use gatepass_core::environment::Clock;

pub mod memory_store;
pub mod notifiers;
pub mod reducer_test;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use chrono::Duration;
    use std::sync::{Mutex, PoisonError};

    /// Clock that only moves when told to.
    ///
    /// Shared between the engine and the test through an `Arc`, so a test can
    /// step past an approval window without sleeping.
    ///
    /// # Example
    ///
    /// ```
    /// use gatepass_testing::mocks::ManualClock;
    /// use gatepass_core::environment::Clock;
    /// use chrono::{Duration, Utc};
    ///
    /// let clock = ManualClock::new(Utc::now());
    /// let time1 = clock.now();
    /// assert_eq!(time1, clock.now());
    /// clock.advance(Duration::seconds(1));
    /// assert!(clock.now() > time1);
    /// ```
    #[derive(Debug)]
    pub struct ManualClock {
        time: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        /// Create a new clock stopped at `time`
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Mutex::new(time),
            }
        }

        /// Move the clock forward (or backward, for a negative duration).
        pub fn advance(&self, by: Duration) {
            let mut time = self.time.lock().unwrap_or_else(PoisonError::into_inner);
            *time += by;
        }

        /// Jump to `time`.
        pub fn set(&self, time: DateTime<Utc>) {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner) = time;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// The instant [`test_clock`] starts at: 2025-01-01 08:00:00 UTC.
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_epoch() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-01T08:00:00Z")
            .expect("hardcoded timestamp should always parse")
            .with_timezone(&Utc)
    }

    /// Create a manual clock for tests, stopped at [`test_epoch`].
    #[must_use]
    pub fn test_clock() -> ManualClock {
        ManualClock::new(test_epoch())
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use gatepass_core::types::Quantity;
    use proptest::prelude::*;

    /// A non-zero quantity up to `max` units.
    pub fn quantity(max: u64) -> impl Strategy<Value = Quantity> {
        (1..=max).prop_map(Quantity::new)
    }

    /// A sequence of pickup attempts, zero included, each up to `max` units.
    pub fn pickup_attempts(max: u64, len: usize) -> impl Strategy<Value = Vec<Quantity>> {
        proptest::collection::vec((0..=max).prop_map(Quantity::new), 0..len)
    }
}

/// Install a test-friendly tracing subscriber (idempotent).
///
/// Honors `RUST_LOG`; output is captured by the test harness.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use memory_store::InMemoryRecordStore;
pub use mocks::{ManualClock, test_clock, test_epoch};
pub use notifiers::{FailingNotifier, RecordingNotifier};
pub use reducer_test::ReducerTest;
