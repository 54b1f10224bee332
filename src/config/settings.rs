use std::{path::Path, time::Duration};

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::logging::LoggingConfig;

/// Which key-value backend holds the telemetry cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    #[default]
    Memory,
    Redis,
}

/// Storage Configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(rename = "type", default)]
    pub storage_type: StorageType,
    /// Connection string, required for `redis`.
    #[serde(default)]
    pub redis_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusSettings {
    /// Buffer of every broker channel before slow subscribers lag.
    pub capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewaySettings {
    /// Outbound queue length per viewer connection.
    pub client_queue_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    pub interval_ms: u64,
    pub stale_after_ms: u64,
    pub max_concurrency: usize,
    /// Start the periodic sync together with the server.
    pub auto_start: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub listen_address: String,
    pub storage: StorageConfig,
    pub bus: BusSettings,
    pub gateway: GatewaySettings,
    pub sync: SyncSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SyncSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_millis(self.stale_after_ms)
    }
}

impl Settings {
    /// Defaults and `FLEETCAST__*` environment variables only.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Defaults, then the optional TOML file, then the environment
    /// (`FLEETCAST__SYNC__INTERVAL_MS=500` and so on).
    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            // Значения по умолчанию
            .set_default("listen_address", "127.0.0.1:3000")?
            .set_default("storage.type", "memory")?
            .set_default("bus.capacity", 1024)?
            .set_default("gateway.client_queue_size", 256)?
            .set_default("sync.interval_ms", 1000)?
            .set_default("sync.stale_after_ms", 5000)?
            .set_default("sync.max_concurrency", 16)?
            .set_default("sync.auto_start", true)?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let cfg = builder
            .add_source(
                Environment::with_prefix("FLEETCAST")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = cfg.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.storage_type == StorageType::Redis && self.storage.redis_url.is_none() {
            return Err(ConfigError::Message(
                "storage.redis_url is required when storage.type = \"redis\"".into(),
            ));
        }
        if self.sync.interval_ms == 0 {
            return Err(ConfigError::Message("sync.interval_ms must be positive".into()));
        }
        if self.sync.max_concurrency == 0 || self.bus.capacity == 0 || self.gateway.client_queue_size == 0 {
            return Err(ConfigError::Message(
                "sync.max_concurrency, bus.capacity and gateway.client_queue_size must be positive".into(),
            ));
        }
        self.logging.validate().map_err(ConfigError::Message)?;
        Ok(())
    }
}
