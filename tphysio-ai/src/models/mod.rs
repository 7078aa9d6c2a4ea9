//! Data models for the analysis pipeline
//!
//! - Submitted input (profile, context, training data) and its validation
//! - Job record and the status wire shape
//! - Weather snapshot

pub mod job;
pub mod metrics;
pub mod profile;
pub mod training;
pub mod weather;

pub use job::{Job, JobResult, JobStatus, JobStatusResponse, StateTransition};
pub use metrics::{
    DecouplingPoint, DecouplingTrend, DerivedMetrics, ElevationMetrics, PacingStrategy,
    QuintileTrend, TerrainDistribution, TerrainSegment, ZoneBucket,
};
pub use profile::{AthleteProfile, FormData, JobInput, Sex, TrainingContext};
pub use training::{TimeSeriesPoint, TrainingData, TrainingSummary};
pub use weather::{WeatherCondition, WeatherInfo};
