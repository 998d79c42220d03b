//! Retry logic with exponential backoff for transient storage failures.
//!
//! Every gate pass operation is a read-decide-commit cycle against versioned
//! rows. When a concurrent writer moves a row on, the commit fails with a
//! conflict and the whole cycle is re-run from a fresh read. Storage
//! timeouts are retried the same way. Business-rule rejections never are.
//!
//! # Example
//!
//! ```rust
//! use gatepass_runtime::retry::{RetryPolicy, retry_with_predicate};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), String> {
//! let policy = RetryPolicy::builder()
//!     .max_retries(5)
//!     .initial_delay(Duration::from_millis(10))
//!     .max_delay(Duration::from_secs(1))
//!     .build();
//!
//! let result = retry_with_predicate(
//!     &policy,
//!     "example",
//!     || async { Ok::<_, String>(42) },
//!     |err: &String| err.contains("conflict"),
//! ).await?;
//! assert_eq!(result, 42);
//! # Ok(())
//! # }
//! ```

use crate::metrics::EngineMetrics;
use gatepass_core::error::GatePassError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Retry policy configuration for exponential backoff.
///
/// # Default Values
///
/// - `max_retries`: 5
/// - `initial_delay`: 10ms
/// - `max_delay`: 1 second
/// - `multiplier`: 2.0 (delay doubles each retry)
/// - `jitter`: 0.5 (each delay is scaled by a random factor in `[0.5, 1.0]`)
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts
    pub max_retries: usize,
    /// Initial delay before first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries (cap for exponential backoff)
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
    /// Fraction of each delay that is randomized (0 disables jitter)
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl RetryPolicy {
    /// Create a new policy builder.
    #[must_use]
    pub const fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder {
            max_retries: None,
            initial_delay: None,
            max_delay: None,
            multiplier: None,
            jitter: None,
        }
    }

    /// A policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self::builder().max_retries(0).build()
    }

    /// Un-jittered delay before retry number `attempt` (zero based):
    /// `initial_delay * multiplier^attempt`, never above `max_delay`.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        let exponent = attempt.min(32) as i32;
        let delay_secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::from_secs_f64(delay_secs.min(self.max_delay.as_secs_f64()))
    }

    /// Delay for an attempt with jitter applied.
    #[must_use]
    pub fn jittered_delay(&self, attempt: usize) -> Duration {
        let base = self.delay_for_attempt(attempt);
        if self.jitter <= 0.0 {
            return base;
        }
        let factor = rand::thread_rng().gen_range((1.0 - self.jitter.min(1.0))..=1.0);
        base.mul_f64(factor)
    }
}

/// Builder for [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    max_retries: Option<usize>,
    initial_delay: Option<Duration>,
    max_delay: Option<Duration>,
    multiplier: Option<f64>,
    jitter: Option<f64>,
}

impl RetryPolicyBuilder {
    /// Set maximum number of retries.
    #[must_use]
    pub const fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Set initial delay before first retry.
    #[must_use]
    pub const fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = Some(delay);
        self
    }

    /// Set maximum delay (cap for exponential backoff).
    #[must_use]
    pub const fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    /// Set multiplier for exponential backoff.
    #[must_use]
    pub const fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = Some(multiplier);
        self
    }

    /// Set the randomized fraction of each delay.
    #[must_use]
    pub const fn jitter(mut self, jitter: f64) -> Self {
        self.jitter = Some(jitter);
        self
    }

    /// Build the [`RetryPolicy`].
    #[must_use]
    pub fn build(self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries.unwrap_or(5),
            initial_delay: self.initial_delay.unwrap_or(Duration::from_millis(10)),
            max_delay: self.max_delay.unwrap_or(Duration::from_secs(1)),
            multiplier: self.multiplier.unwrap_or(2.0),
            jitter: self.jitter.unwrap_or(0.5),
        }
    }
}

/// Retry an async operation while `is_retryable` says so.
///
/// Returns the first success, the first non-retryable error, or the last
/// error once `max_retries` retries are exhausted.
///
/// # Errors
///
/// Returns the operation's error as described above.
pub async fn retry_with_predicate<F, Fut, T, E, P>(
    policy: &RetryPolicy,
    operation: &'static str,
    mut attempt_fn: F,
    is_retryable: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0;
    loop {
        let err = match attempt_fn().await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::debug!(operation, retries = attempt, "Recovered after retrying");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !is_retryable(&err) || attempt >= policy.max_retries {
            if attempt > 0 {
                tracing::warn!(operation, retries = attempt, error = %err, "Giving up");
            }
            return Err(err);
        }

        let delay = policy.jittered_delay(attempt);
        tracing::debug!(
            operation,
            attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %err,
            "Transient failure, backing off"
        );
        EngineMetrics::record_storage_retry(operation);
        sleep(delay).await;
        attempt += 1;
    }
}

/// Retry a gate pass operation on storage conflicts and timeouts.
///
/// # Errors
///
/// Returns the first business-rule rejection or fatal storage error, or the
/// last transient error once retries are exhausted.
pub async fn retry_transient<F, Fut, T>(
    policy: &RetryPolicy,
    operation: &'static str,
    attempt_fn: F,
) -> Result<T, GatePassError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatePassError>>,
{
    retry_with_predicate(policy, operation, attempt_fn, GatePassError::is_transient).await
}
