//! tphysio-ai library interface
//!
//! Background analysis of training recordings: enrichment, derived metrics
//! and AI report generation, driven per job and exposed over HTTP.

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod types;
pub mod utils;

pub use crate::error::{ApiError, ApiResult, PipelineError};

use axum::{extract::DefaultBodyLimit, Router};
use chrono::{DateTime, Utc};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tphysio_common::events::EventBus;

use crate::services::JobOrchestrator;

/// Largest accepted request body; recordings are submitted inline as JSON
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Job registry and pipeline driver
    pub orchestrator: JobOrchestrator,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(orchestrator: JobOrchestrator) -> Self {
        let event_bus = orchestrator.event_bus().clone();
        Self {
            orchestrator,
            event_bus,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::process_routes())
        .route("/api/process/events", get(api::job_event_stream))
        .merge(api::health_routes())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
