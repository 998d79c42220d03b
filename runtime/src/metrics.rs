//! Prometheus metrics for the gate pass engine.
//!
//! Metrics are recorded through the `metrics` facade and are free when no
//! recorder is installed. The service installs the Prometheus exporter with
//! [`MetricsServer`].
//!
//! # Example
//!
//! ```rust,no_run
//! use gatepass_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Start metrics server on port 9090
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // Metrics available at http://localhost:9090/metrics
//! # Ok(())
//! # }
//! ```

use crate::scanner::SweepReport;
use gatepass_core::error::GatePassError;
use gatepass_core::machine::GatePassEvent;
use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics server.
///
/// Exposes metrics on an HTTP endpoint for Prometheus scraping.
pub struct MetricsServer {
    addr: SocketAddr,
    started: bool,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address to bind to (e.g., `0.0.0.0:9090`)
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            started: false,
        }
    }

    /// Install the exporter and start serving `/metrics`.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or a recorder is
    /// already installed.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        PrometheusBuilder::new()
            .with_http_listener(self.addr)
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?
            .install()
            .map_err(|e| MetricsError::Install(e.to_string()))?;

        self.started = true;
        tracing::info!(
            addr = %self.addr,
            "Metrics server started - available at http://{}/metrics",
            self.addr
        );
        Ok(())
    }

    /// Whether [`MetricsServer::start`] succeeded.
    #[must_use]
    pub const fn is_started(&self) -> bool {
        self.started
    }

    /// The listen address.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(
        "gatepass_transitions_total",
        "Accepted gate pass transitions, by kind"
    );
    describe_counter!(
        "gatepass_rejections_total",
        "Rejected gate pass operations, by reason"
    );
    describe_histogram!(
        "gatepass_pickup_quantity",
        "Units withdrawn per accepted pickup"
    );
    describe_counter!(
        "gatepass_storage_retries_total",
        "Operations retried after a storage conflict or timeout"
    );
    describe_counter!(
        "gatepass_scanner_expired_total",
        "Passes expired by the expiration scanner"
    );
    describe_counter!(
        "gatepass_scanner_failures_total",
        "Passes the expiration scanner failed to expire"
    );
    describe_histogram!(
        "gatepass_scanner_sweep_duration_seconds",
        "Duration of one expiration sweep"
    );
}

/// Engine metrics recorder.
pub struct EngineMetrics;

impl EngineMetrics {
    /// Record the events of an accepted transition.
    pub fn record_events(events: &[GatePassEvent]) {
        for event in events {
            let kind = match event {
                GatePassEvent::PassCreated { .. } => "created",
                GatePassEvent::PassApproved { .. } => "approved",
                GatePassEvent::PickupRecorded { pickup, .. } => {
                    #[allow(clippy::cast_precision_loss)]
                    histogram!("gatepass_pickup_quantity").record(pickup.quantity.units() as f64);
                    "pickup_recorded"
                }
                GatePassEvent::PassCompleted { .. } => "completed",
                GatePassEvent::PassExpired { .. } => "expired",
                GatePassEvent::InventoryDeducted { .. } => continue,
            };
            counter!("gatepass_transitions_total", "kind" => kind).increment(1);
        }
    }

    /// Record a rejected or failed operation.
    pub fn record_rejection(error: &GatePassError) {
        counter!("gatepass_rejections_total", "reason" => error.kind()).increment(1);
    }

    /// Record a retry after a transient storage failure.
    pub fn record_storage_retry(operation: &'static str) {
        counter!("gatepass_storage_retries_total", "operation" => operation).increment(1);
    }
}

/// Expiration scanner metrics recorder.
pub struct ScannerMetrics;

impl ScannerMetrics {
    /// Record one sweep.
    pub fn record_sweep(report: &SweepReport, duration: Duration) {
        counter!("gatepass_scanner_expired_total").increment(report.expired as u64);
        counter!("gatepass_scanner_failures_total").increment(report.failed as u64);
        histogram!("gatepass_scanner_sweep_duration_seconds").record(duration.as_secs_f64());
    }
}
