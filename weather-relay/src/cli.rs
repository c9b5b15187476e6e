use std::path::PathBuf;

use clap::Parser;
use weather_core::{Geoid, RelayConfig, WeatherError};

#[derive(Debug, Parser)]
#[command(name = "weather-relay", version, about = "Relay weather changes to WebSocket clients")]
pub struct Args {
    /// Server hostname
    #[arg(long)]
    pub host: Option<String>,

    /// Server port
    #[arg(long)]
    pub port: Option<u16>,

    /// Path to a JSON config file (defaults to the user config dir)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Poll interval per location, in milliseconds
    #[arg(long = "interval-ms")]
    pub interval_ms: Option<u64>,

    /// Location to track; repeat to track several. Replaces the configured list.
    #[arg(long = "geoid")]
    pub geoids: Vec<Geoid>,
}

impl Args {
    pub fn resolve(&self) -> Result<RelayConfig, WeatherError> {
        let mut config = match &self.config {
            Some(path) => RelayConfig::load_from(path)?,
            None => RelayConfig::load(),
        };
        self.apply(&mut config);
        Ok(config)
    }

    /// Command-line values win over the config file.
    pub fn apply(&self, config: &mut RelayConfig) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(ms) = self.interval_ms {
            config.keeper.sync_interval_ms = ms;
        }
        if !self.geoids.is_empty() {
            config.locations = self.geoids.clone();
        }
        config.locations.sort_unstable();
        config.locations.dedup();
    }
}
