//! Logger module
//!
//! Thin layer over `tracing`:
//! - subscriber initialisation from [`LoggingConfig`]
//! - server lifecycle messages
//! - access log lines (target `access`) in several formats

mod format;

pub use format::AccessLogEntry;

use crate::config::{Config, LoggingConfig};
use std::net::SocketAddr;
use tracing_subscriber::EnvFilter;

/// Initialize the global subscriber
///
/// `RUST_LOG` wins over `logging.level`. Should be called once at startup;
/// a second call returns an error.
pub fn init(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.level))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
}

pub fn log_server_start(addr: &SocketAddr, config: &Config, route_count: usize) {
    tracing::info!("======================================");
    tracing::info!("Dispatch server started");
    tracing::info!("Listening on: http://{addr}");
    tracing::info!("Log level: {}", config.logging.level);
    tracing::info!("Registered routes: {route_count}");
    if let Some(workers) = config.server.workers {
        tracing::info!("Worker threads: {workers}");
    }
    match config.performance.stage_timeout_ms {
        Some(ms) => tracing::info!("Stage timeout: {ms}ms"),
        None => tracing::info!("Stage timeout: disabled"),
    }
    tracing::info!("======================================");
}

pub fn log_connection_accepted(peer_addr: &SocketAddr) {
    tracing::debug!(%peer_addr, "connection accepted");
}

pub fn log_connection_error(err: &impl std::fmt::Debug) {
    tracing::error!("Failed to serve connection: {err:?}");
}

/// Log formatted access log entry
pub fn log_access(entry: &AccessLogEntry, format: &str) {
    tracing::info!(target: "access", "{}", entry.format(format));
}
