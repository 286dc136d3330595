//! LogWarden configuration system.
//!
//! TOML-based configuration with environment variable override support.
//! Every section has serde defaults so a partial file (or no file at all)
//! yields a runnable configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

/// Configuration error types. All of these are fatal at boot.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub bus: BusConfig,
    pub store: StoreConfig,
    pub notifier: NotifierConfig,
    pub log_processing: LogProcessingConfig,
    pub alerting: AlertingConfig,
    pub monitoring: MonitoringConfig,
    pub templates: TemplatesConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            bus: BusConfig::default(),
            store: StoreConfig::default(),
            notifier: NotifierConfig::default(),
            log_processing: LogProcessingConfig::default(),
            alerting: AlertingConfig::default(),
            monitoring: MonitoringConfig::default(),
            templates: TemplatesConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Check cross-field invariants that serde defaults cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bus.brokers.is_empty() {
            return Err(ConfigError::ValidationError(
                "bus.brokers must not be empty".into(),
            ));
        }
        if self.bus.topic.is_empty() {
            return Err(ConfigError::ValidationError(
                "bus.topic must not be empty".into(),
            ));
        }
        if self.store.addresses.is_empty() {
            return Err(ConfigError::ValidationError(
                "store.addresses must not be empty".into(),
            ));
        }
        if self.alerting.default_threshold <= 0 {
            return Err(ConfigError::ValidationError(
                "alerting.default_threshold must be positive".into(),
            ));
        }
        if self.alerting.default_time_window == 0 {
            return Err(ConfigError::ValidationError(
                "alerting.default_time_window must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// HTTP control-plane server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Message bus (Kafka) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub brokers: Vec<String>,
    pub topic: String,
    pub group_id: String,
    pub min_bytes: u32,
    pub max_bytes: u32,
    /// Maximum broker wait when min_bytes is not yet available, in
    /// milliseconds.
    pub max_wait_ms: u64,
    /// Where a fresh consumer group starts: "earliest" or "latest".
    pub start_offset: String,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            brokers: vec!["localhost:9092".to_string()],
            topic: "application-logs".to_string(),
            group_id: "logwarden".to_string(),
            min_bytes: 1,
            max_bytes: 10 * 1024 * 1024,
            max_wait_ms: 500,
            start_offset: "latest".to_string(),
        }
    }
}

/// Key-value store deployment mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreMode {
    Standalone,
    Cluster,
}

/// State store (Redis) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub mode: StoreMode,
    pub addresses: Vec<String>,
    /// Per-call timeout in seconds.
    pub timeout_secs: u64,
    pub pool_size: usize,
    pub max_retries: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            mode: StoreMode::Standalone,
            addresses: vec!["redis://localhost:6379".to_string()],
            timeout_secs: 5,
            pool_size: 10,
            max_retries: 3,
        }
    }
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Chat webhook configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    pub webhook_url: String,
    pub channel: String,
    pub username: String,
    pub icon_emoji: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            webhook_url: String::new(),
            channel: "#alerts".to_string(),
            username: "LogWarden".to_string(),
            icon_emoji: ":rotating_light:".to_string(),
            timeout_secs: 30,
        }
    }
}

impl NotifierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Log ingestion pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogProcessingConfig {
    pub enabled: bool,
    pub batch_size: usize,
    pub flush_interval_secs: u64,
    pub retry_attempts: u32,
    pub retry_delay_secs: u64,
    pub default_log_level: String,
    /// Persist per-instance log stats every this many records.
    pub stats_every: u64,
}

impl Default for LogProcessingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            batch_size: 100,
            flush_interval_secs: 5,
            retry_attempts: 3,
            retry_delay_secs: 1,
            default_log_level: "INFO".to_string(),
            stats_every: 5,
        }
    }
}

/// Alert evaluation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertingConfig {
    pub enabled: bool,
    pub batch_size: usize,
    pub flush_interval_secs: u64,
    /// Fallback window for rules created without one, in seconds.
    pub default_time_window: u64,
    pub default_threshold: i64,
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            batch_size: 50,
            flush_interval_secs: 5,
            default_time_window: 300,
            default_threshold: 10,
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub enabled: bool,
    pub log_level: String,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_level: "info".to_string(),
        }
    }
}

/// Message templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplatesConfig {
    /// Alert message template. Empty means the built-in default.
    pub alert_message: String,
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            alert_message: String::new(),
        }
    }
}
