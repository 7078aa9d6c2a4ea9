//! Elevation lookup clients
//!
//! Two interchangeable backends implement `ElevationProvider`:
//! - Open-Elevation: `POST {"locations": [{latitude, longitude}, ...]}`
//! - Open-Meteo: `GET ?latitude=a,b,..&longitude=x,y,..`
//!
//! Both return one elevation per requested location, in request order.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::types::{ElevationProvider, ProviderError};

const USER_AGENT: &str = concat!("tphysio-ai/", env!("CARGO_PKG_VERSION"));

fn build_http_client(timeout: Duration) -> Result<Client, ProviderError> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| ProviderError::Permanent(format!("Failed to create HTTP client: {}", e)))
}

async fn read_body(response: reqwest::Response) -> Result<String, ProviderError> {
    let status = response.status();
    let body = response.text().await.map_err(ProviderError::from_reqwest)?;
    if !status.is_success() {
        return Err(ProviderError::from_status(status.as_u16(), &body));
    }
    Ok(body)
}

// ============================================================================
// Open-Elevation
// ============================================================================

#[derive(Debug, Serialize)]
struct LookupRequest {
    locations: Vec<Location>,
}

#[derive(Debug, Serialize)]
struct Location {
    latitude: f64,
    longitude: f64,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    results: Vec<LookupResult>,
}

#[derive(Debug, Deserialize)]
struct LookupResult {
    elevation: f64,
}

/// Open-Elevation client
pub struct OpenElevationClient {
    http_client: Client,
    url: String,
}

impl OpenElevationClient {
    pub fn new(url: String, timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            http_client: build_http_client(timeout)?,
            url,
        })
    }
}

#[async_trait::async_trait]
impl ElevationProvider for OpenElevationClient {
    fn name(&self) -> &'static str {
        "Open-Elevation"
    }

    async fn lookup(&self, locations: &[(f64, f64)]) -> Result<Vec<f64>, ProviderError> {
        debug!(count = locations.len(), "Open-Elevation lookup");

        let request = LookupRequest {
            locations: locations
                .iter()
                .map(|&(latitude, longitude)| Location { latitude, longitude })
                .collect(),
        };

        let response = self
            .http_client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(ProviderError::from_reqwest)?;

        parse_open_elevation(&read_body(response).await?)
    }
}

/// Parse an Open-Elevation lookup response
pub fn parse_open_elevation(body: &str) -> Result<Vec<f64>, ProviderError> {
    let response: LookupResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::Parse(format!("Invalid Open-Elevation response: {}", e)))?;
    Ok(response.results.into_iter().map(|r| r.elevation).collect())
}

// ============================================================================
// Open-Meteo
// ============================================================================

#[derive(Debug, Deserialize)]
struct OpenMeteoElevationResponse {
    elevation: Vec<f64>,
}

/// Open-Meteo elevation client
pub struct OpenMeteoElevationClient {
    http_client: Client,
    url: String,
}

impl OpenMeteoElevationClient {
    pub fn new(url: String, timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            http_client: build_http_client(timeout)?,
            url,
        })
    }
}

#[async_trait::async_trait]
impl ElevationProvider for OpenMeteoElevationClient {
    fn name(&self) -> &'static str {
        "Open-Meteo"
    }

    async fn lookup(&self, locations: &[(f64, f64)]) -> Result<Vec<f64>, ProviderError> {
        debug!(count = locations.len(), "Open-Meteo elevation lookup");

        let join = |pick: fn(&(f64, f64)) -> f64| {
            locations
                .iter()
                .map(|l| format!("{:.6}", pick(l)))
                .collect::<Vec<_>>()
                .join(",")
        };

        let response = self
            .http_client
            .get(&self.url)
            .query(&[("latitude", join(|l| l.0)), ("longitude", join(|l| l.1))])
            .send()
            .await
            .map_err(ProviderError::from_reqwest)?;

        parse_open_meteo_elevation(&read_body(response).await?)
    }
}

/// Parse an Open-Meteo elevation response
pub fn parse_open_meteo_elevation(body: &str) -> Result<Vec<f64>, ProviderError> {
    let response: OpenMeteoElevationResponse = serde_json::from_str(body)
        .map_err(|e| {
            ProviderError::Parse(format!("Invalid Open-Meteo elevation response: {}", e))
        })?;
    Ok(response.elevation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_open_elevation_keeps_order() {
        let body = r#"{"results": [
            {"latitude": 10.0, "longitude": 10.0, "elevation": 515},
            {"latitude": 20.0, "longitude": 20.0, "elevation": 545.5}
        ]}"#;
        assert_eq!(parse_open_elevation(body).unwrap(), vec![515.0, 545.5]);
    }

    #[test]
    fn test_parse_open_meteo_elevation() {
        let body = r#"{"elevation": [38.0, 42.0, 7.0]}"#;
        assert_eq!(parse_open_meteo_elevation(body).unwrap(), vec![38.0, 42.0, 7.0]);
    }

    #[test]
    fn test_malformed_body_is_parse_error() {
        assert!(matches!(
            parse_open_elevation("<html>502</html>"),
            Err(ProviderError::Parse(_))
        ));
    }
}
