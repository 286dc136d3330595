//! Configuration loader with file and environment variable support.

use std::env;
use std::path::PathBuf;

use tracing::info;

use crate::{AppConfig, ConfigError, StoreMode};

/// Standard config file search paths.
const CONFIG_PATHS: &[&str] = &[
    "config.toml",
    "logwarden.toml",
    "./config/config.toml",
    "./config/logwarden.toml",
    "/etc/logwarden/config.toml",
];

/// Configuration loader.
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Create a loader with a specific config file path.
    pub fn with_path<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            config_path: Some(path.into()),
        }
    }

    /// Load configuration from file (if found) with environment variable
    /// overrides applied on top.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let mut config = AppConfig::default();

        if let Some(path) = self.find_config_file() {
            info!(?path, "Loading configuration from file");
            config = AppConfig::from_file(&path)?;
        }

        self.apply_env_overrides(&mut config);
        config.validate()?;

        Ok(config)
    }

    fn find_config_file(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config_path {
            if path.exists() {
                return Some(path.clone());
            }
        }

        if let Ok(path) = env::var("LOGWARDEN_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        for path in CONFIG_PATHS {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        None
    }

    fn apply_env_overrides(&self, config: &mut AppConfig) {
        // Server
        if let Ok(val) = env::var("LOGWARDEN_SERVER_ADDRESS") {
            config.server.address = val;
        }

        // Bus
        if let Ok(val) = env::var("LOGWARDEN_BUS_BROKERS") {
            config.bus.brokers = val.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Ok(val) = env::var("LOGWARDEN_BUS_TOPIC") {
            config.bus.topic = val;
        }
        if let Ok(val) = env::var("LOGWARDEN_BUS_GROUP_ID") {
            config.bus.group_id = val;
        }
        if let Ok(val) = env::var("LOGWARDEN_BUS_START_OFFSET") {
            config.bus.start_offset = val;
        }

        // Store
        if let Ok(val) = env::var("LOGWARDEN_STORE_MODE") {
            match val.to_ascii_lowercase().as_str() {
                "cluster" => config.store.mode = StoreMode::Cluster,
                "standalone" => config.store.mode = StoreMode::Standalone,
                _ => {}
            }
        }
        if let Ok(val) = env::var("LOGWARDEN_STORE_ADDRESSES") {
            config.store.addresses = val.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Ok(val) = env::var("LOGWARDEN_STORE_TIMEOUT_SECS") {
            if let Ok(secs) = val.parse() {
                config.store.timeout_secs = secs;
            }
        }

        // Notifier
        if let Ok(val) = env::var("LOGWARDEN_NOTIFIER_WEBHOOK_URL") {
            config.notifier.webhook_url = val;
        }
        if let Ok(val) = env::var("LOGWARDEN_NOTIFIER_CHANNEL") {
            config.notifier.channel = val;
        }
        if let Ok(val) = env::var("LOGWARDEN_NOTIFIER_TIMEOUT_SECS") {
            if let Ok(secs) = val.parse() {
                config.notifier.timeout_secs = secs;
            }
        }

        // Log processing
        if let Ok(val) = env::var("LOGWARDEN_LOG_PROCESSING_BATCH_SIZE") {
            if let Ok(size) = val.parse() {
                config.log_processing.batch_size = size;
            }
        }
        if let Ok(val) = env::var("LOGWARDEN_DEFAULT_LOG_LEVEL") {
            config.log_processing.default_log_level = val;
        }

        // Alerting
        if let Ok(val) = env::var("LOGWARDEN_ALERTING_ENABLED") {
            if let Ok(enabled) = val.parse() {
                config.alerting.enabled = enabled;
            }
        }

        // Templates
        if let Ok(val) = env::var("LOGWARDEN_ALERT_TEMPLATE") {
            config.templates.alert_message = val;
        }
    }
}
