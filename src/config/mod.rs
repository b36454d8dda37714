//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origin for CORS (comma-separated)
    pub client_origin: String,
    /// Maximum players per lobby
    pub lobby_capacity: usize,
    /// Interval between global sweep passes
    pub sweep_interval: Duration,
}

impl Config {
    /// Load configuration from environment variables. Everything has a
    /// default; the server runs out of the box.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosting platforms hand us PORT, fall back to SERVER_ADDR
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        let lobby_capacity = match env::var("LOBBY_CAPACITY") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| ConfigError::InvalidNumber("LOBBY_CAPACITY"))?,
            Err(_) => 10,
        };

        let sweep_interval_ms = match env::var("SWEEP_INTERVAL_MS") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| ConfigError::InvalidNumber("SWEEP_INTERVAL_MS"))?,
            Err(_) => 500,
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            client_origin: env::var("CLIENT_ORIGIN").unwrap_or_else(|_| "*".to_string()),
            lobby_capacity,
            sweep_interval: Duration::from_millis(sweep_interval_ms),
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid server address format")]
    InvalidAddress,

    #[error("Invalid numeric value for {0}")]
    InvalidNumber(&'static str),
}
