// Configuration module entry point
// Loads server, logging and dispatch settings from file + environment

mod types;

use std::net::SocketAddr;

pub use types::{Config, HttpConfig, LoggingConfig, PerformanceConfig, ServerConfig};

impl Config {
    /// Load configuration from specified file path (without extension)
    ///
    /// The file is optional; missing keys fall back to defaults. Environment
    /// variables override the file, e.g. `SERVER_HTTP__MAX_BODY_SIZE=1024`.
    pub fn load_from(config_path: &str) -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(
                config::Environment::with_prefix("SERVER")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        settings.try_deserialize()
    }

    pub fn get_socket_addr(&self) -> Result<SocketAddr, String> {
        self.socket_addr_for(self.server.port)
    }

    /// Address on the configured host with an explicit port
    pub fn socket_addr_for(&self, port: u16) -> Result<SocketAddr, String> {
        format!("{}:{port}", self.server.host)
            .parse()
            .map_err(|e| format!("Invalid address: {e}"))
    }
}
