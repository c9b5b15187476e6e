use std::time::Duration;

use async_trait::async_trait;
use reqwest::{redirect, Client, ClientBuilder};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::config::ApiConfig;
use crate::error::WeatherError;

/// Numeric location identifier understood by the weather service.
pub type Geoid = u32;

/// Weather data as returned by the service. The core never looks inside it.
pub type Snapshot = Value;

pub const DEFAULT_BASE_URL: &str = "http://ekb.shri14.ru/api";

/// Anything the keeper can pull locality snapshots from.
#[async_trait]
pub trait LocalitySource: Send + Sync + 'static {
    async fn locality_info(&self, geoid: Geoid) -> Result<Snapshot, WeatherError>;
}

/// Thin JSON client for the weather service. Every call issues exactly one GET
/// and hands back the decoded body untouched.
#[derive(Debug, Clone)]
pub struct WeatherClient {
    http: Client,
    base_url: Url,
}

impl WeatherClient {
    pub fn new(http: Client, base_url: &str) -> Result<Self, WeatherError> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))?;
        Ok(Self { http, base_url })
    }

    pub fn from_config(config: &ApiConfig) -> Result<Self, WeatherError> {
        let mut builder = ClientBuilder::new()
            .redirect(redirect::Policy::limited(5))
            .user_agent(config.user_agent.clone());
        if let Some(ms) = config.request_timeout_ms {
            builder = builder.timeout(Duration::from_millis(ms));
        }
        let http = builder.build().map_err(WeatherError::Network)?;
        Self::new(http, &config.base_url)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub async fn locality_info(&self, geoid: Geoid) -> Result<Snapshot, WeatherError> {
        self.get_json(&format!("/localities/{geoid}")).await
    }

    pub async fn cities(&self, geoid: Geoid) -> Result<Snapshot, WeatherError> {
        self.get_json(&format!("/localities/{geoid}/cities")).await
    }

    pub async fn provinces(&self, geoid: Geoid) -> Result<Snapshot, WeatherError> {
        self.get_json(&format!("/localities/{geoid}/provinces")).await
    }

    /// Aggregated current conditions for several locations in one request.
    pub async fn factual(&self, geoids: &[Geoid]) -> Result<Snapshot, WeatherError> {
        let ids = geoids
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        self.get_json(&format!("/factual?ids={ids}")).await
    }

    fn endpoint(&self, path: &str) -> Result<Url, WeatherError> {
        // Url::join would drop the base path segment, so append textually.
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}{path}"))?)
    }

    async fn get_json(&self, path: &str) -> Result<Snapshot, WeatherError> {
        let url = self.endpoint(path)?;
        debug!(%url, "requesting weather service");
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(WeatherError::Network)?;

        let status = response.status();
        if !status.is_success() {
            return Err(WeatherError::Status {
                status,
                url: url.to_string(),
            });
        }

        response.json::<Snapshot>().await.map_err(WeatherError::Decode)
    }
}

#[async_trait]
impl LocalitySource for WeatherClient {
    async fn locality_info(&self, geoid: Geoid) -> Result<Snapshot, WeatherError> {
        WeatherClient::locality_info(self, geoid).await
    }
}
