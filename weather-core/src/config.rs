use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::client::{Geoid, DEFAULT_BASE_URL};
use crate::error::WeatherError;

pub const DEFAULT_SYNC_INTERVAL_MS: u64 = 30_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RelayConfig {
    pub api: ApiConfig,
    pub keeper: KeeperConfig,
    pub locations: Vec<Geoid>,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    /// No timeout unless set; a hung request then stalls only its own keeper.
    pub request_timeout_ms: Option<u64>,
    pub user_agent: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct KeeperConfig {
    pub sync_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub channel_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            keeper: KeeperConfig::default(),
            locations: vec![213, 54],
            server: ServerConfig::default(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_ms: None,
            user_agent: concat!("weather-relay/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl Default for KeeperConfig {
    fn default() -> Self {
        Self {
            sync_interval_ms: DEFAULT_SYNC_INTERVAL_MS,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8000,
            channel_capacity: 64,
        }
    }
}

impl KeeperConfig {
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            sync_interval_ms: u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }
}

impl RelayConfig {
    /// `<config_dir>/weather-relay/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("weather-relay").join("config.json"))
    }

    /// Loads the config from the default location, falling back to defaults
    /// when the file is missing or unreadable.
    pub fn load() -> Self {
        let Some(path) = Self::default_path() else {
            warn!("no config directory on this platform, using defaults");
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(err) => {
                warn!(error = %err, "failed to load config, using defaults");
                Self::default()
            }
        }
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, WeatherError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| WeatherError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| WeatherError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<(), WeatherError> {
        let path = path.as_ref();
        let io_err = |source| WeatherError::ConfigIo {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(io_err)
    }
}
