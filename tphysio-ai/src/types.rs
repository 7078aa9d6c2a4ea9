//! Provider traits and shared types
//!
//! Every external service the pipeline calls sits behind one of these traits:
//! - **WeatherProvider:** conditions at the session start
//! - **ElevationProvider:** terrain elevation for coordinate batches
//! - **TextGenerator:** generative model that writes the report
//!
//! The HTTP clients in `services` implement them; tests substitute fakes.

use chrono::{DateTime, Utc};
use thiserror::Error;

// ============================================================================
// Errors
// ============================================================================

/// Provider call failure, classified for the retry loops
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// Overloaded, rate limited, timed out: worth retrying after a backoff
    #[error("Transient provider error: {0}")]
    Transient(String),

    /// Rejected request, bad credentials, unknown model: retrying will not help
    #[error("Provider error: {0}")]
    Permanent(String),

    /// Response arrived but could not be understood
    #[error("Parse error: {0}")]
    Parse(String),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }

    /// Classify an HTTP status that is not a success
    pub fn from_status(status: u16, body: &str) -> Self {
        let detail = format!("HTTP {}: {}", status, truncate(body, 300));
        match status {
            408 | 429 | 500 | 502 | 503 | 504 => ProviderError::Transient(detail),
            _ => ProviderError::Permanent(detail),
        }
    }

    /// Classify a transport error
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            ProviderError::Transient(err.to_string())
        } else if err.is_decode() {
            ProviderError::Parse(err.to_string())
        } else {
            ProviderError::Permanent(err.to_string())
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let mut cut: String = text.chars().take(max_chars).collect();
        cut.push('…');
        cut
    }
}

// ============================================================================
// Weather
// ============================================================================

/// Which weather dataset answers a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeatherSource {
    /// Session is today: current conditions
    Current,
    /// Session within the last 7 days: hourly short-range data
    Forecast,
    /// Older session: hourly archive data
    Archive,
}

/// Raw weather values before rounding/categorisation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeatherReading {
    pub temperature_c: f64,
    pub relative_humidity: f64,
    /// WMO weather interpretation code
    pub weather_code: i64,
}

#[async_trait::async_trait]
pub trait WeatherProvider: Send + Sync {
    /// Provider name for logging
    fn name(&self) -> &'static str;

    /// Conditions at (lat, lon) for the hour of `at`
    async fn fetch(
        &self,
        latitude: f64,
        longitude: f64,
        at: DateTime<Utc>,
        source: WeatherSource,
    ) -> Result<WeatherReading, ProviderError>;
}

// ============================================================================
// Elevation
// ============================================================================

#[async_trait::async_trait]
pub trait ElevationProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Elevations for an ordered batch of (lat, lon); `result[i]` belongs to `locations[i]`
    async fn lookup(&self, locations: &[(f64, f64)]) -> Result<Vec<f64>, ProviderError>;
}

// ============================================================================
// Text generation
// ============================================================================

#[async_trait::async_trait]
pub trait TextGenerator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Generate text for `prompt` with the given model tier
    async fn generate(&self, model: &str, prompt: &str) -> Result<String, ProviderError>;
}
