//! Process lifecycle and graceful shutdown.
//!
//! [`Application`] owns the engine and the expiration scanner task:
//!
//! 1. **Startup**: spawn the scanner, which sweeps once immediately
//! 2. **Runtime**: wait for a shutdown signal
//! 3. **Shutdown**: broadcast to the scanner and wait for it to finish its
//!    current sweep, bounded by the configured timeout

use gatepass_runtime::{ExpirationScanner, GatePassEngine};
use std::future::Future;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Running sweeper with its background task.
pub struct Application {
    engine: GatePassEngine,
    sweep_interval: Duration,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_timeout: Duration,
}

impl Application {
    /// Create a new application instance.
    #[must_use]
    pub fn new(engine: GatePassEngine, sweep_interval: Duration, shutdown_timeout: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            engine,
            sweep_interval,
            shutdown_tx,
            shutdown_timeout,
        }
    }

    /// Run until `shutdown` completes, then stop the scanner.
    pub async fn run(self, shutdown: impl Future<Output = ()>) {
        let scanner = ExpirationScanner::new(self.engine, self.sweep_interval);
        let handle = scanner.spawn(self.shutdown_tx.subscribe());
        info!(
            sweep_interval_secs = self.sweep_interval.as_secs(),
            "Sweeper running"
        );

        shutdown.await;
        info!("Shutdown requested, stopping expiration scanner");

        // No receiver left means the scanner already exited.
        let _ = self.shutdown_tx.send(());

        match tokio::time::timeout(self.shutdown_timeout, handle).await {
            Ok(Ok(())) => info!("Expiration scanner stopped gracefully"),
            Ok(Err(e)) => warn!(error = %e, "Expiration scanner task failed"),
            Err(_) => warn!(
                timeout_secs = self.shutdown_timeout.as_secs(),
                "Expiration scanner shutdown timed out"
            ),
        }

        info!("Graceful shutdown complete");
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
///
/// If a handler cannot be installed, that signal source is ignored and the
/// other one still applies.
pub async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        () = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use gatepass_core::environment::Clock;
    use gatepass_core::gate_pass::GatePassStatus;
    use gatepass_core::store::RecordStore;
    use gatepass_core::types::{ActorId, CustomerId, LocationKey, Quantity};
    use gatepass_runtime::EngineConfig;
    use gatepass_testing::{InMemoryRecordStore, test_clock};
    use std::sync::Arc;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn run_sweeps_and_stops_on_shutdown() {
        let memory = Arc::new(InMemoryRecordStore::new());
        let store: Arc<dyn RecordStore> = memory.clone();
        let clock = Arc::new(test_clock());
        let shared_clock: Arc<dyn Clock> = clock.clone();
        let engine = GatePassEngine::new(store, shared_clock, EngineConfig::default());

        let lot = engine
            .register_lot(
                CustomerId::new(),
                LocationKey::new("bay-1"),
                "crated tiles".to_string(),
                Quantity::new(50),
            )
            .await
            .unwrap();
        let pass = engine
            .create(lot.id, ActorId::new("driver-7"), ActorId::new("clerk-2"), Quantity::new(20))
            .await
            .unwrap();
        engine
            .approve(pass.id, Quantity::new(20), ActorId::new("manager-1"))
            .await
            .unwrap();
        clock.advance(chrono::Duration::hours(16));

        let app = Application::new(
            engine.clone(),
            Duration::from_secs(3600),
            Duration::from_secs(2),
        );
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let running = tokio::spawn(app.run(async move {
            let _ = stop_rx.await;
        }));

        // The first sweep runs as soon as the scanner starts.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            let stored = memory.load_pass(pass.id).await.unwrap().unwrap();
            let status = stored.record.status;
            if status == GatePassStatus::Expired {
                break;
            }
            assert!(tokio::time::Instant::now() < deadline, "pass never expired");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        stop_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(2), running)
            .await
            .expect("application did not stop")
            .unwrap();
    }
}
