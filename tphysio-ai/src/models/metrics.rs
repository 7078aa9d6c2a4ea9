//! Derived analytics of a session (output of the metrics engine)

use serde::{Deserialize, Serialize};

/// Pacing over the two halves of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PacingStrategy {
    /// Second half more than 2% faster
    NegativeSplit,
    /// Second half more than 2% slower
    PositiveSplit,
    Uniform,
    InsufficientData,
}

impl PacingStrategy {
    pub fn label(&self) -> &'static str {
        match self {
            Self::NegativeSplit => "Negative split (sped up)",
            Self::PositiveSplit => "Positive split (slowed down)",
            Self::Uniform => "Uniform split",
            Self::InsufficientData => "Insufficient data",
        }
    }
}

/// Time spent in one heart-rate zone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneBucket {
    pub zone: String,
    pub min_bpm: u32,
    pub max_bpm: u32,
    /// Share of valid heart-rate samples, one decimal
    pub percentage: f64,
    pub seconds: u64,
    /// `MM:SS`
    pub time: String,
}

/// Efficiency factor of one quintile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecouplingPoint {
    /// Quintile start, e.g. "40%"
    pub name: String,
    /// km/h per bpm, three decimals; 0 when the quintile lacks data
    pub efficiency: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecouplingTrend {
    pub trend: Vec<DecouplingPoint>,
    /// Percentage drop first → last quintile; `None` is N/A
    pub overall_drop_pct: Option<f64>,
}

/// Per-quintile values of cadence or stride length
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuintileTrend {
    pub trend: Vec<f64>,
    /// Percentage drop first → last quintile; `None` is N/A or estimated
    pub overall_drop_pct: Option<f64>,
    /// Values come from the stride model, not from a sensor
    pub estimated: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TerrainSegment {
    pub distance_km: f64,
    /// Share of total moving distance, whole percent
    pub percentage: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TerrainDistribution {
    pub uphill: TerrainSegment,
    pub downhill: TerrainSegment,
    pub flat: TerrainSegment,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElevationMetrics {
    /// Metres, rounded
    pub gain: i64,
    /// Metres, rounded
    pub loss: i64,
    pub terrain_distribution: TerrainDistribution,
}

/// Everything the metrics engine derives from a series and a profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedMetrics {
    /// Set on the "insufficient data" sentinel
    pub insufficient_data: bool,
    pub pacing_strategy: PacingStrategy,
    pub zone_distribution: Option<Vec<ZoneBucket>>,
    pub decoupling: DecouplingTrend,
    pub cadence: QuintileTrend,
    pub stride_length: QuintileTrend,
    pub is_cadence_estimated: bool,
    pub elevation: Option<ElevationMetrics>,
    pub training_load: Option<i64>,
}

impl DerivedMetrics {
    /// Sentinel for series too short to analyse; every field is N/A
    pub fn insufficient() -> Self {
        Self {
            insufficient_data: true,
            pacing_strategy: PacingStrategy::InsufficientData,
            zone_distribution: None,
            decoupling: DecouplingTrend::default(),
            cadence: QuintileTrend::default(),
            stride_length: QuintileTrend::default(),
            is_cadence_estimated: false,
            elevation: None,
            training_load: None,
        }
    }
}
