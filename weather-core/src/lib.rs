pub mod client;
pub mod config;
pub mod error;
pub mod hash;
pub mod keeper;

pub use client::{Geoid, LocalitySource, Snapshot, WeatherClient, DEFAULT_BASE_URL};
pub use config::{ApiConfig, KeeperConfig, RelayConfig, ServerConfig};
pub use error::WeatherError;
pub use hash::ContentHash;
pub use keeper::{sync_once, KeeperEvent, KeeperState, WeatherKeeper};
