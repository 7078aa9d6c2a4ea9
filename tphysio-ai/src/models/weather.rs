//! Weather snapshot attached to an analysis

use serde::{Deserialize, Serialize};

/// Weather category derived from a WMO weather code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherCondition {
    Sunny,
    PartlyCloudy,
    Cloudy,
    Fog,
    Rain,
    Snow,
    Thunderstorm,
    Unknown,
}

impl WeatherCondition {
    /// Map a WMO weather interpretation code to its category
    pub fn from_wmo_code(code: i64) -> Self {
        match code {
            0 | 1 => Self::Sunny,
            2 => Self::PartlyCloudy,
            3 => Self::Cloudy,
            45 | 48 => Self::Fog,
            51 | 53 | 55 | 56 | 57 | 61 | 63 | 65 | 66 | 67 | 80 | 81 | 82 => Self::Rain,
            71 | 73 | 75 | 77 | 85 | 86 => Self::Snow,
            95 | 96 | 99 => Self::Thunderstorm,
            _ => Self::Unknown,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Sunny => "sunny",
            Self::PartlyCloudy => "partly_cloudy",
            Self::Cloudy => "cloudy",
            Self::Fog => "fog",
            Self::Rain => "rain",
            Self::Snow => "snow",
            Self::Thunderstorm => "thunderstorm",
            Self::Unknown => "unknown",
        }
    }
}

/// Conditions at the start of the session
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherInfo {
    /// Degrees Celsius, rounded
    pub temperature: i32,
    /// Relative humidity percent, rounded
    pub humidity: i32,
    #[serde(rename = "iconCode")]
    pub condition: WeatherCondition,
}
