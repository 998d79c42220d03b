//! Ergonomic testing utilities for reducers
//!
//! This module provides a fluent API for testing reducers with readable Given-When-Then syntax.

#![allow(clippy::module_name_repetitions)] // ReducerTest is the natural name

use gatepass_core::reducer::Reducer;
use std::fmt::Debug;

/// Type alias for state assertion functions
type StateAssertion<S> = Box<dyn FnOnce(&S)>;

/// Type alias for event assertion functions
type EventAssertion<Ev> = Box<dyn FnOnce(&[Ev])>;

/// Type alias for error assertion functions
type ErrorAssertion<Er> = Box<dyn FnOnce(&Er)>;

/// Fluent API for testing reducers with Given-When-Then syntax
///
/// A test either expects the action to be accepted (`then_events`) or
/// rejected (`then_error`). State assertions run in both cases; on rejection
/// they see the untouched state.
///
/// # Example
///
/// ```ignore
/// use gatepass_testing::ReducerTest;
///
/// ReducerTest::new(GatePassReducer::new())
///     .with_env(environment)
///     .given_state(state)
///     .when_action(GatePassAction::Expire { pass_id })
///     .then_events(|events| assert!(events.is_empty()))
///     .run();
/// ```
pub struct ReducerTest<R>
where
    R: Reducer,
{
    reducer: R,
    environment: Option<R::Environment>,
    initial_state: Option<R::State>,
    action: Option<R::Action>,
    state_assertions: Vec<StateAssertion<R::State>>,
    event_assertions: Vec<EventAssertion<R::Event>>,
    error_assertions: Vec<ErrorAssertion<R::Error>>,
}

impl<R> ReducerTest<R>
where
    R: Reducer,
    R::Event: Debug,
    R::Error: Debug,
{
    /// Create a new reducer test with the given reducer
    #[must_use]
    pub const fn new(reducer: R) -> Self {
        Self {
            reducer,
            environment: None,
            initial_state: None,
            action: None,
            state_assertions: Vec::new(),
            event_assertions: Vec::new(),
            error_assertions: Vec::new(),
        }
    }

    /// Set the environment for the test
    #[must_use]
    pub fn with_env(mut self, env: R::Environment) -> Self {
        self.environment = Some(env);
        self
    }

    /// Set the initial state (Given)
    #[must_use]
    pub fn given_state(mut self, state: R::State) -> Self {
        self.initial_state = Some(state);
        self
    }

    /// Set the action to test (When)
    #[must_use]
    pub fn when_action(mut self, action: R::Action) -> Self {
        self.action = Some(action);
        self
    }

    /// Add an assertion about the resulting state (Then)
    #[must_use]
    pub fn then_state<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&R::State) + 'static,
    {
        self.state_assertions.push(Box::new(assertion));
        self
    }

    /// Expect the action to be accepted and assert on its events (Then)
    #[must_use]
    pub fn then_events<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&[R::Event]) + 'static,
    {
        self.event_assertions.push(Box::new(assertion));
        self
    }

    /// Expect the action to be rejected and assert on the error (Then)
    #[must_use]
    pub fn then_error<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&R::Error) + 'static,
    {
        self.error_assertions.push(Box::new(assertion));
        self
    }

    /// Run the test and execute all assertions
    ///
    /// # Panics
    ///
    /// Panics if initial state, action, or environment is not set, if the
    /// outcome (accepted or rejected) differs from what the assertions
    /// expect, or if any assertion fails.
    #[allow(clippy::panic)] // Test code can panic
    #[allow(clippy::expect_used)] // Test code can use expect
    pub fn run(self) {
        let mut state = self
            .initial_state
            .expect("Initial state must be set with given_state()");

        let action = self.action.expect("Action must be set with when_action()");

        let env = self
            .environment
            .expect("Environment must be set with with_env()");

        let outcome = self.reducer.reduce(&mut state, action, &env);

        match &outcome {
            Ok(events) => {
                assert!(
                    self.error_assertions.is_empty(),
                    "Expected the action to be rejected, but it produced {events:?}"
                );
                for assertion in self.event_assertions {
                    assertion(events.as_slice());
                }
            }
            Err(error) => {
                assert!(
                    self.event_assertions.is_empty(),
                    "Expected the action to be accepted, but it was rejected: {error:?}"
                );
                for assertion in self.error_assertions {
                    assertion(error);
                }
            }
        }

        for assertion in self.state_assertions {
            assertion(&state);
        }
    }
}

/// Helper assertions for events
pub mod assertions {
    /// Assert that there are no events
    ///
    /// # Panics
    ///
    /// Panics if events is not empty.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_no_events<Ev: std::fmt::Debug>(events: &[Ev]) {
        assert!(
            events.is_empty(),
            "Expected no events, but found {}: {:?}",
            events.len(),
            events
        );
    }

    /// Assert the number of events
    ///
    /// # Panics
    ///
    /// Panics if the number of events doesn't match expected.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_events_count<Ev>(events: &[Ev], expected: usize) {
        assert_eq!(
            events.len(),
            expected,
            "Expected {} events, but found {}",
            expected,
            events.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatepass_core::reducer::Events;
    use smallvec::smallvec;

    #[derive(Clone, Debug)]
    struct TestState {
        count: u32,
    }

    #[derive(Clone, Debug)]
    enum TestAction {
        Increment,
        Decrement,
    }

    #[derive(Debug, PartialEq)]
    enum TestEvent {
        Incremented,
        Decremented,
    }

    #[derive(Debug, PartialEq)]
    struct Underflow;

    struct TestReducer;

    struct TestEnv;

    impl Reducer for TestReducer {
        type State = TestState;
        type Action = TestAction;
        type Event = TestEvent;
        type Error = Underflow;
        type Environment = TestEnv;

        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            _env: &Self::Environment,
        ) -> Result<Events<Self::Event>, Self::Error> {
            match action {
                TestAction::Increment => {
                    state.count += 1;
                    Ok(smallvec![TestEvent::Incremented])
                }
                TestAction::Decrement => {
                    state.count = state.count.checked_sub(1).ok_or(Underflow)?;
                    Ok(smallvec![TestEvent::Decremented])
                }
            }
        }
    }

    #[test]
    fn test_reducer_test_increment() {
        ReducerTest::new(TestReducer)
            .with_env(TestEnv)
            .given_state(TestState { count: 0 })
            .when_action(TestAction::Increment)
            .then_state(|state| {
                assert_eq!(state.count, 1);
            })
            .then_events(|events| {
                assertions::assert_events_count(events, 1);
                assert_eq!(events[0], TestEvent::Incremented);
            })
            .run();
    }

    #[test]
    fn test_reducer_test_rejection() {
        ReducerTest::new(TestReducer)
            .with_env(TestEnv)
            .given_state(TestState { count: 0 })
            .when_action(TestAction::Decrement)
            .then_error(|error| assert_eq!(*error, Underflow))
            .then_state(|state| {
                assert_eq!(state.count, 0);
            })
            .run();
    }

    #[test]
    fn test_assertions_no_events() {
        assertions::assert_no_events::<TestEvent>(&[]);
    }
}
