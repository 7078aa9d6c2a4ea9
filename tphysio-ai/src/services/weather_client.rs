//! Open-Meteo weather client
//!
//! - Current conditions: `/v1/forecast?current=...`
//! - Recent days: `/v1/forecast?hourly=...&start_date=..&end_date=..`
//! - Older days: archive `/v1/archive?hourly=...`
//!
//! Hourly requests use `timezone=GMT` so the hourly index is the UTC hour of
//! the session start.

use chrono::{DateTime, Timelike, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::types::{ProviderError, WeatherProvider, WeatherReading, WeatherSource};

const VARIABLES: &str = "temperature_2m,relative_humidity_2m,weather_code";
const USER_AGENT: &str = concat!("tphysio-ai/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct CurrentResponse {
    current: Option<CurrentBlock>,
}

#[derive(Debug, Deserialize)]
struct CurrentBlock {
    temperature_2m: Option<f64>,
    relative_humidity_2m: Option<f64>,
    weather_code: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct HourlyResponse {
    hourly: Option<HourlyBlock>,
}

#[derive(Debug, Deserialize)]
struct HourlyBlock {
    #[serde(default)]
    temperature_2m: Vec<Option<f64>>,
    #[serde(default)]
    relative_humidity_2m: Vec<Option<f64>>,
    #[serde(default)]
    weather_code: Vec<Option<f64>>,
}

/// Open-Meteo weather client
pub struct OpenMeteoWeatherClient {
    http_client: Client,
    forecast_url: String,
    archive_url: String,
}

impl OpenMeteoWeatherClient {
    pub fn new(
        forecast_url: String,
        archive_url: String,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ProviderError::Permanent(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            forecast_url,
            archive_url,
        })
    }

    async fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<String, ProviderError> {
        let response = self
            .http_client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(ProviderError::from_reqwest)?;

        let status = response.status();
        let body = response.text().await.map_err(ProviderError::from_reqwest)?;
        if !status.is_success() {
            return Err(ProviderError::from_status(status.as_u16(), &body));
        }
        Ok(body)
    }
}

#[async_trait::async_trait]
impl WeatherProvider for OpenMeteoWeatherClient {
    fn name(&self) -> &'static str {
        "Open-Meteo"
    }

    async fn fetch(
        &self,
        latitude: f64,
        longitude: f64,
        at: DateTime<Utc>,
        source: WeatherSource,
    ) -> Result<WeatherReading, ProviderError> {
        let mut query = vec![
            ("latitude", format!("{:.4}", latitude)),
            ("longitude", format!("{:.4}", longitude)),
        ];

        let url = match source {
            WeatherSource::Current => {
                query.push(("current", VARIABLES.to_string()));
                query.push(("timezone", "auto".to_string()));
                &self.forecast_url
            }
            WeatherSource::Forecast | WeatherSource::Archive => {
                let date = at.format("%Y-%m-%d").to_string();
                query.push(("start_date", date.clone()));
                query.push(("end_date", date));
                query.push(("hourly", VARIABLES.to_string()));
                query.push(("timezone", "GMT".to_string()));
                if source == WeatherSource::Archive {
                    &self.archive_url
                } else {
                    &self.forecast_url
                }
            }
        };

        debug!(?source, url = %url, "Requesting weather");
        let body = self.get_json(url, &query).await?;

        match source {
            WeatherSource::Current => parse_current(&body),
            WeatherSource::Forecast | WeatherSource::Archive => {
                parse_hourly(&body, at.hour() as usize)
            }
        }
    }
}

/// Parse a `current=` response
pub fn parse_current(body: &str) -> Result<WeatherReading, ProviderError> {
    let response: CurrentResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::Parse(format!("Invalid weather response: {}", e)))?;
    let current = response
        .current
        .ok_or_else(|| ProviderError::Parse("Weather response has no current block".to_string()))?;

    match (current.temperature_2m, current.relative_humidity_2m, current.weather_code) {
        (Some(temperature_c), Some(relative_humidity), Some(code)) => Ok(WeatherReading {
            temperature_c,
            relative_humidity,
            weather_code: code as i64,
        }),
        _ => Err(ProviderError::Parse("Current weather block incomplete".to_string())),
    }
}

/// Parse an `hourly=` response and pick the values at `hour`
pub fn parse_hourly(body: &str, hour: usize) -> Result<WeatherReading, ProviderError> {
    let response: HourlyResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::Parse(format!("Invalid weather response: {}", e)))?;
    let hourly = response
        .hourly
        .ok_or_else(|| ProviderError::Parse("Weather response has no hourly block".to_string()))?;

    let at = |values: &[Option<f64>]| values.get(hour).copied().flatten();
    match (
        at(&hourly.temperature_2m),
        at(&hourly.relative_humidity_2m),
        at(&hourly.weather_code),
    ) {
        (Some(temperature_c), Some(relative_humidity), Some(code)) => Ok(WeatherReading {
            temperature_c,
            relative_humidity,
            weather_code: code as i64,
        }),
        _ => Err(ProviderError::Parse(format!("No hourly weather values for hour {}", hour))),
    }
}
