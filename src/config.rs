//! Server configuration from environment variables

use crate::retention::{DEFAULT_PURGE_INTERVAL_SECS, DEFAULT_RETENTION_DAYS};
use std::env;

#[derive(Debug)]
pub enum ConfigError {
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite pulse database
    pub db_path: String,
    /// HTTP listen address
    pub bind_addr: String,
    /// Rolling retention window in days
    pub retention_days: i64,
    /// Purge cadence in seconds
    pub purge_interval_secs: u64,
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `PULSEFLOW_DB_PATH` (default: data/pulses.db)
    /// - `BIND_ADDR` (default: 0.0.0.0:8080)
    /// - `RETENTION_DAYS` (default: 5)
    /// - `PURGE_INTERVAL_SECS` (default: 3600)
    pub fn from_env() -> Self {
        Self {
            db_path: env::var("PULSEFLOW_DB_PATH")
                .unwrap_or_else(|_| "data/pulses.db".to_string()),

            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),

            retention_days: env::var("RETENTION_DAYS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_RETENTION_DAYS),

            purge_interval_secs: env::var("PURGE_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_PURGE_INTERVAL_SECS),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.db_path.is_empty() {
            return Err(ConfigError::InvalidValue(
                "PULSEFLOW_DB_PATH cannot be empty".to_string(),
            ));
        }

        if self.bind_addr.is_empty() {
            return Err(ConfigError::InvalidValue(
                "BIND_ADDR cannot be empty".to_string(),
            ));
        }

        if self.retention_days < 1 {
            return Err(ConfigError::InvalidValue(format!(
                "RETENTION_DAYS must be at least 1, got {}",
                self.retention_days
            )));
        }

        if self.purge_interval_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "PURGE_INTERVAL_SECS must be non-zero".to_string(),
            ));
        }

        Ok(())
    }
}
