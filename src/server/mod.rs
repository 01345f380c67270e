// Server module entry point
// Accept loop, per-connection serving and shutdown signals

pub mod connection;
pub mod signal;

// Rust does not allow `loop` as a module name (keyword), so use server_loop
#[path = "loop.rs"]
pub mod server_loop;

use crate::config::Config;
use std::time::Duration;

pub use server_loop::start_server_loop;
pub use signal::shutdown_signal;

/// Connection-level settings derived from [`Config`]
#[derive(Debug, Clone)]
pub struct ServeSettings {
    pub max_connections: Option<u64>,
    pub keep_alive: bool,
    /// Time allowed for a request's headers to arrive, including the wait
    /// for the next request on an idle keep-alive connection
    pub header_read_timeout: Duration,
    pub access_log: bool,
    pub access_log_format: String,
}

impl From<&Config> for ServeSettings {
    fn from(config: &Config) -> Self {
        let perf = &config.performance;
        Self {
            max_connections: perf.max_connections,
            keep_alive: perf.keep_alive_timeout > 0,
            header_read_timeout: Duration::from_secs(perf.read_timeout),
            access_log: config.logging.access_log,
            access_log_format: config.logging.access_log_format.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serve_settings_from_config() {
        let mut config = Config::default();
        config.performance.read_timeout = 5;
        config.performance.keep_alive_timeout = 0;
        let settings = ServeSettings::from(&config);
        assert_eq!(settings.header_read_timeout, Duration::from_secs(5));
        assert!(!settings.keep_alive);
    }
}
