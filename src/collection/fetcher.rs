use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;

use crate::models::RawReading;
use crate::settings::{Secrets, SourceSettings};
use crate::{log_debug, log_warn};

const ENABLE_LOGS: bool = true;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    AirQuality,
    CarbonIntensity,
}

impl SourceKind {
    pub fn name(&self) -> &'static str {
        match self {
            SourceKind::AirQuality => "air_quality",
            SourceKind::CarbonIntensity => "carbon_intensity",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Retrieves one raw document per call.
///
/// Transport and HTTP failures come back as `None`; nothing is cached
/// between calls.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch_source(&self, source: SourceKind) -> Option<RawReading>;
}

/// Fetches both feeds over HTTPS.
pub struct HttpFetcher {
    client: reqwest::Client,
    sources: SourceSettings,
    aqi_token: Option<String>,
    carbon_token: Option<String>,
}

impl HttpFetcher {
    pub fn new(sources: SourceSettings, secrets: &Secrets) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(sources.timeout_secs))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            sources,
            aqi_token: secrets.aqi_token.clone(),
            carbon_token: secrets.carbon_token.clone(),
        })
    }

    async fn fetch_air_quality(&self) -> Result<RawReading> {
        let Some(token) = &self.aqi_token else {
            bail!("AQI_API_TOKEN is not set");
        };
        let request = self
            .client
            .get(&self.sources.air_quality_url)
            .query(&[("token", token.as_str())]);
        send_json(request).await
    }

    async fn fetch_carbon_intensity(&self) -> Result<RawReading> {
        let Some(token) = &self.carbon_token else {
            bail!("CARBON_API_TOKEN is not set");
        };
        let request = self
            .client
            .get(&self.sources.carbon_intensity_url)
            .query(&[
                ("lat", self.sources.latitude.to_string()),
                ("lon", self.sources.longitude.to_string()),
            ])
            .header("auth-token", token);
        send_json(request).await
    }
}

async fn send_json(request: reqwest::RequestBuilder) -> Result<RawReading> {
    let response = request.send().await.context("request failed")?;
    let status = response.status();
    if !status.is_success() {
        bail!("unexpected status {status}");
    }
    response
        .json::<RawReading>()
        .await
        .context("response body is not JSON")
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch_source(&self, source: SourceKind) -> Option<RawReading> {
        let result = match source {
            SourceKind::AirQuality => self.fetch_air_quality().await,
            SourceKind::CarbonIntensity => self.fetch_carbon_intensity().await,
        };

        match result {
            Ok(reading) => {
                log_debug!("{source} response: {reading}");
                Some(reading)
            }
            Err(err) => {
                log_warn!("{source} fetch failed: {err:#}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_token_yields_none() {
        let fetcher = HttpFetcher::new(SourceSettings::default(), &Secrets::default()).unwrap();
        assert!(fetcher.fetch_source(SourceKind::AirQuality).await.is_none());
        assert!(fetcher.fetch_source(SourceKind::CarbonIntensity).await.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_host_yields_none() {
        let sources = SourceSettings {
            air_quality_url: "http://127.0.0.1:9/feed".into(),
            timeout_secs: 1,
            ..Default::default()
        };
        let secrets = Secrets {
            aqi_token: Some("token".into()),
            ..Default::default()
        };
        let fetcher = HttpFetcher::new(sources, &secrets).unwrap();
        assert!(fetcher.fetch_source(SourceKind::AirQuality).await.is_none());
    }
}
