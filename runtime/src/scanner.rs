//! Expiration scanner.
//!
//! Finds every approved or partially completed pass whose window has lapsed
//! and expires it. Runs on a fixed interval as a background task, and on
//! demand before active passes are listed. A failure on one pass is logged
//! and counted; the pass is picked up again by the next sweep.

use crate::engine::{ExpireOutcome, GatePassEngine};
use crate::metrics::ScannerMetrics;
use gatepass_core::error::GatePassError;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Outcome of one sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Passes found past their window
    pub examined: usize,
    /// Passes expired by this sweep
    pub expired: usize,
    /// Passes that no longer needed expiring (completed or expired meanwhile)
    pub skipped: usize,
    /// Passes that could not be expired
    pub failed: usize,
}

pub(crate) async fn sweep(engine: &GatePassEngine) -> Result<SweepReport, GatePassError> {
    let started = Instant::now();
    let now = engine.now();
    let storage = engine.storage();
    let due = storage.call(storage.store().list_expirable(now)).await?;

    let mut report = SweepReport {
        examined: due.len(),
        ..SweepReport::default()
    };

    for pass_id in due {
        match engine.expire(pass_id).await {
            Ok(ExpireOutcome::Expired(_)) => report.expired += 1,
            Ok(ExpireOutcome::Unchanged(_)) => report.skipped += 1,
            Err(error) => {
                tracing::warn!(
                    %pass_id,
                    error = %error,
                    "Failed to expire gate pass, will retry on next sweep"
                );
                report.failed += 1;
            }
        }
    }

    ScannerMetrics::record_sweep(&report, started.elapsed());
    if report.examined > 0 {
        tracing::info!(
            examined = report.examined,
            expired = report.expired,
            skipped = report.skipped,
            failed = report.failed,
            "Expiration sweep finished"
        );
    }
    Ok(report)
}

/// Periodic expiration sweeper.
pub struct ExpirationScanner {
    engine: GatePassEngine,
    interval: Duration,
}

impl ExpirationScanner {
    /// Creates a scanner sweeping every `interval`.
    #[must_use]
    pub const fn new(engine: GatePassEngine, interval: Duration) -> Self {
        Self { engine, interval }
    }

    /// The sweep interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one sweep now.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the due passes cannot be listed.
    pub async fn sweep(&self) -> Result<SweepReport, GatePassError> {
        sweep(&self.engine).await
    }

    /// Sweep every interval until `shutdown` fires.
    ///
    /// The first sweep runs immediately.
    pub fn spawn(self, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!(
                interval_secs = self.interval.as_secs(),
                "Expiration scanner started"
            );

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.recv() => {
                        tracing::info!("Expiration scanner stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(error) = self.sweep().await {
                            tracing::error!(error = %error, "Expiration sweep failed");
                        }
                    }
                }
            }
        })
    }
}
