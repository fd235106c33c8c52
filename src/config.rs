//! # Configuration Management Module
//!
//! ## Purpose
//! Centralized configuration management for the alert engine, supporting
//! TOML files and environment variable overrides with validation and
//! type-safe access to all system settings.
//!
//! ## Input/Output Specification
//! - **Input**: Configuration files (TOML), environment variables
//! - **Output**: Validated configuration structs with defaults and overrides
//! - **Validation**: Type checking, range validation, dependency verification
//!
//! ## Configuration Sources (in order of precedence)
//! 1. Environment variables (highest priority)
//! 2. Configuration files
//! 3. Default values (lowest priority)
//!
//! ## Usage
//! ```rust,no_run
//! use legal_alerts::config::Config;
//!
//! let config = Config::from_file("config.toml").unwrap();
//! println!("Server port: {}", config.server.port);
//! ```

use crate::errors::{Result, SearchError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure containing all system settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server and API configuration
    pub server: ServerConfig,
    /// Search-engine connection settings
    pub engine: EngineConfig,
    /// Alert and percolation behavior
    pub alerts: AlertsConfig,
    /// Outbound notification delivery
    pub notifications: NotificationsConfig,
    /// Storage and database settings
    pub storage: StorageConfig,
    /// Logging and monitoring
    pub logging: LoggingConfig,
    /// Performance tuning
    pub performance: PerformanceConfig,
}

/// Server and API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Request timeout in seconds
    pub request_timeout_seconds: u64,
    /// Enable CORS
    pub enable_cors: bool,
}

/// Search-engine connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Base URL of the search engine's REST interface
    pub base_url: String,
    /// Per-request timeout in seconds
    pub request_timeout_seconds: u64,
    /// Connection timeout in seconds
    pub connect_timeout_seconds: u64,
}

/// Alert compilation and percolation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsConfig {
    /// Page size used when draining percolator matches
    pub percolator_page_size: usize,
    /// Child top-hits kept per parent group
    pub top_hits_default: usize,
    /// Child top-hits kept when the query pins one exact group.
    /// The engine refuses windows above 100.
    pub top_hits_single_group: usize,
    /// Days after which sent scheduled hits are purged
    pub scheduled_hit_retention_days: i64,
}

/// Outbound notification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    /// Endpoint of the external mailer service alert emails are handed to
    pub mailer_url: String,
    /// From address placed on alert emails
    pub from_email: String,
    /// Timeout for webhook and mailer POSTs in seconds
    pub delivery_timeout_seconds: u64,
}

/// Storage and database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database file path
    pub db_path: PathBuf,
    /// Compress stored document payloads
    pub enable_compression: bool,
}

/// Logging and monitoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Enable structured JSON logging
    pub json_format: bool,
}

/// Performance tuning configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    /// Number of worker threads for the HTTP server
    pub worker_threads: usize,
}

impl Config {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        Self::from_file("config.toml")
    }

    /// Load configuration from a specific file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::warn!("Configuration file not found: {:?}, using defaults", path);
            let mut config = Self::default();
            config.apply_env_overrides()?;
            config.validate()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path).map_err(|e| SearchError::Config {
            message: format!("Failed to read config file {:?}: {}", path, e),
        })?;

        let mut config: Config = toml::from_str(&content).map_err(|e| SearchError::Config {
            message: format!("Failed to parse config file {:?}: {}", path, e),
        })?;

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(host) = std::env::var("LEGAL_ALERTS_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("LEGAL_ALERTS_PORT") {
            self.server.port = port.parse().map_err(|_| SearchError::Config {
                message: "Invalid port number in LEGAL_ALERTS_PORT".to_string(),
            })?;
        }
        if let Ok(url) = std::env::var("LEGAL_ALERTS_ENGINE_URL") {
            self.engine.base_url = url;
        }
        if let Ok(db_path) = std::env::var("LEGAL_ALERTS_DB_PATH") {
            self.storage.db_path = PathBuf::from(db_path);
        }
        if let Ok(url) = std::env::var("LEGAL_ALERTS_MAILER_URL") {
            self.notifications.mailer_url = url;
        }

        Ok(())
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(SearchError::ValidationFailed {
                field: "server.port".to_string(),
                reason: "Port cannot be zero".to_string(),
            });
        }

        if self.engine.base_url.is_empty() {
            return Err(SearchError::ValidationFailed {
                field: "engine.base_url".to_string(),
                reason: "Search engine URL cannot be empty".to_string(),
            });
        }

        if self.alerts.percolator_page_size == 0 {
            return Err(SearchError::ValidationFailed {
                field: "alerts.percolator_page_size".to_string(),
                reason: "Percolator page size must be greater than zero".to_string(),
            });
        }

        if self.alerts.top_hits_default > self.alerts.top_hits_single_group {
            return Err(SearchError::ValidationFailed {
                field: "alerts.top_hits_default".to_string(),
                reason: "Default top-hits window cannot exceed the single-group window"
                    .to_string(),
            });
        }

        // Hard limit imposed by the engine's top_hits aggregation.
        if self.alerts.top_hits_single_group > 100 {
            return Err(SearchError::ValidationFailed {
                field: "alerts.top_hits_single_group".to_string(),
                reason: "The engine caps top-hits windows at 100".to_string(),
            });
        }

        Ok(())
    }

    /// Get configuration as TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| SearchError::Config {
            message: format!("Failed to serialize config to TOML: {}", e),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                request_timeout_seconds: 30,
                enable_cors: true,
            },
            engine: EngineConfig {
                base_url: "http://localhost:9200".to_string(),
                request_timeout_seconds: 10,
                connect_timeout_seconds: 5,
            },
            alerts: AlertsConfig {
                percolator_page_size: 100,
                top_hits_default: 5,
                top_hits_single_group: 100,
                scheduled_hit_retention_days: 90,
            },
            notifications: NotificationsConfig {
                mailer_url: "http://localhost:8025/send".to_string(),
                from_email: "alerts@legal-search.example".to_string(),
                delivery_timeout_seconds: 10,
            },
            storage: StorageConfig {
                db_path: PathBuf::from("./data/legal_alerts.db"),
                enable_compression: true,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                json_format: false,
            },
            performance: PerformanceConfig {
                worker_threads: num_cpus::get(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_oversized_top_hits_window() {
        let mut config = Config::default();
        config.alerts.top_hits_single_group = 500;
        assert!(config.validate().is_err());
    }

    #[test]
    fn round_trips_through_toml() {
        let config = Config::default();
        let serialized = config.to_toml().unwrap();
        let parsed: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.server.port, config.server.port);
        assert_eq!(parsed.alerts.top_hits_default, config.alerts.top_hits_default);
    }
}
