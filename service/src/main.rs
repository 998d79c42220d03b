//! Gate pass expiration sweeper.
//!
//! Runs migrations, serves Prometheus metrics and expires lapsed gate passes
//! on a fixed interval until Ctrl+C or SIGTERM.

use gatepass_core::environment::SystemClock;
use gatepass_core::notify::Notifier;
use gatepass_postgres::PostgresRecordStore;
use gatepass_runtime::metrics::MetricsServer;
use gatepass_runtime::{GatePassEngine, TracingNotifier};
use gatepass_service::{Application, Config, shutdown_signal};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_new(&config.server.log_level)
                .unwrap_or_else(|_| "gatepass=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        sweep_interval_secs = config.engine.sweep_interval_secs,
        approval_window_hours = config.engine.approval_window_hours,
        "Starting gate pass sweeper"
    );

    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.postgres.max_connections)
        .acquire_timeout(Duration::from_secs(config.postgres.connect_timeout))
        .connect(&config.postgres.url)
        .await?;
    let store = PostgresRecordStore::from_pool(pool);
    store.migrate().await?;
    info!("Database ready");

    let mut metrics = MetricsServer::new(config.metrics_addr()?);
    metrics.start()?;

    let notifiers: Vec<Arc<dyn Notifier>> = vec![Arc::new(TracingNotifier)];
    let engine = GatePassEngine::new(Arc::new(store), Arc::new(SystemClock), config.engine_config())
        .with_notifiers(notifiers);

    Application::new(engine, config.sweep_interval(), config.shutdown_timeout())
        .run(shutdown_signal())
        .await;

    Ok(())
}
