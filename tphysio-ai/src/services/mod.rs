//! Services for tphysio-ai
//!
//! Pipeline stages, the job registry and orchestrator, and the HTTP clients
//! behind the provider traits.

pub mod analysis;
pub mod elevation_client;
pub mod enrichment;
pub mod gemini_client;
pub mod job_orchestrator;
pub mod job_store;
pub mod metrics_engine;
pub mod prompt;
pub mod weather_client;

pub use analysis::{AnalysisOutput, AnalysisStage};
pub use elevation_client::{OpenElevationClient, OpenMeteoElevationClient};
pub use enrichment::{EnrichmentOutput, EnrichmentStage};
pub use gemini_client::GeminiClient;
pub use job_orchestrator::JobOrchestrator;
pub use job_store::{CancelOutcome, JobHandle, JobStore};
pub use metrics_engine::MetricsEngine;
pub use prompt::PromptBuilder;
pub use weather_client::OpenMeteoWeatherClient;
