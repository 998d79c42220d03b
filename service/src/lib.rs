//! Gate pass sweeper service.
//!
//! Connects the engine to `PostgreSQL`, exposes Prometheus metrics and runs
//! the expiration scanner until the process is asked to stop.

pub mod config;
pub mod lifecycle;

pub use config::Config;
pub use lifecycle::{Application, shutdown_signal};
