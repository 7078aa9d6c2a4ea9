//! Unified training recording
//!
//! The external parsers (CSV/GPX/TCX) produce this shape. All units are SI:
//! metres, seconds, metres per second.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// One sample of a recording
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSeriesPoint {
    /// Unix epoch milliseconds; also the identity key used when merging elevations
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    /// Cumulative distance in metres
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heart_rate: Option<f64>,
    /// Metres per second
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// Steps per minute (both legs)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cadence: Option<f64>,
    /// Metres above sea level
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
}

impl TimeSeriesPoint {
    /// Both coordinates, if present
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }

    /// Timestamp as a UTC instant
    pub fn instant(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp).single()
    }
}

/// Summary values computed by the parser
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingSummary {
    #[serde(default)]
    pub total_time_seconds: f64,
    #[serde(default)]
    pub total_distance_meters: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_heart_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_heart_rate: Option<f64>,
}

/// Parsed recording: summary + point series
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingData {
    #[serde(default)]
    pub summary: TrainingSummary,
    pub time_series: Vec<TimeSeriesPoint>,
}
