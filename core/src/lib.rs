//! # Gatepass Core
//!
//! Domain types and the pure state machine for gate passes: time-boxed,
//! quantity-bounded authorizations to withdraw goods from a stored lot.
//!
//! ## Core Concepts
//!
//! - **Lot**: bulk goods received at a location
//! - **Gate pass**: authorization to withdraw part of a lot, approved for a
//!   quantity and a time window
//! - **Pickup event**: one accepted withdrawal increment (append-only)
//! - **Location counter**: stock on hand at one location, never negative
//! - **Audit entry**: immutable record of every transition
//!
//! ## Architecture
//!
//! The [`machine::GatePassReducer`] is a pure function
//! `(state, action, environment) → events`. It owns every business rule. The
//! runtime crate loads state from a [`store::RecordStore`], runs the reducer,
//! and commits the resulting records atomically with optimistic concurrency.
//!
//! ## Example
//!
//! ```
//! use gatepass_core::environment::SystemClock;
//! use gatepass_core::machine::{GatePassAction, GatePassEnvironment, GatePassReducer, GatePassState};
//! use gatepass_core::reducer::Reducer;
//! use gatepass_core::types::GatePassId;
//! use std::sync::Arc;
//!
//! let env = GatePassEnvironment::with_default_window(Arc::new(SystemClock));
//! let mut state = GatePassState::default();
//! let pass_id = GatePassId::new();
//!
//! let result = GatePassReducer::new().reduce(&mut state, GatePassAction::Expire { pass_id }, &env);
//! assert!(result.is_err());
//! ```

pub mod audit;
pub mod error;
pub mod gate_pass;
pub mod ledger;
pub mod lot;
pub mod machine;
pub mod notify;
pub mod pickup;
pub mod store;
pub mod types;
pub mod version;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use error::GatePassError;
pub use gate_pass::{GatePass, GatePassStatus};
pub use types::{Actor, ActorId, GatePassId, LocationKey, LotId, PickupId, Quantity};

/// Reducer module - Core business logic abstraction
///
/// Reducers are pure functions that validate an action against the current
/// state, and on success apply the resulting events to the state.
pub mod reducer {
    use smallvec::SmallVec;

    /// Events produced by one reduction. Most actions produce one to three.
    pub type Events<E> = SmallVec<[E; 4]>;

    /// The Reducer trait - core abstraction for business logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: The domain state this reducer operates on
    /// - `Action`: The action type this reducer processes
    /// - `Event`: Facts produced by accepted actions
    /// - `Error`: Rejection type
    /// - `Environment`: The injected dependencies this reducer needs
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The event type produced by accepted actions
        type Event;

        /// The rejection type
        type Error;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into events
        ///
        /// This is a pure function that:
        /// 1. Validates the action
        /// 2. Updates state in place by applying the events
        /// 3. Returns the events for the runtime to persist
        ///
        /// # Errors
        ///
        /// Returns `Self::Error` if the action is rejected; the state is
        /// left unchanged.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> Result<Events<Self::Event>, Self::Error>;
    }
}

/// Environment module - Dependency injection traits
///
/// All external dependencies are abstracted behind traits and injected
/// via the Environment parameter.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use gatepass_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let _now = clock.now();
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock reading the system time.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
