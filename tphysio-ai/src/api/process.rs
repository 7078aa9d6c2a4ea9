//! Analysis job API handlers
//!
//! POST /api/process/start, GET /api/process/status/:job_id,
//! POST /api/process/cancel

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{JobInput, JobStatusResponse};
use crate::services::CancelOutcome;
use crate::AppState;

/// POST /api/process/start response; the client reads `jobId`
#[derive(Debug, Serialize, Deserialize)]
pub struct StartJobResponse {
    #[serde(rename = "jobId", alias = "job_id")]
    pub job_id: Uuid,
}

/// POST /api/process/cancel request
#[derive(Debug, Deserialize)]
pub struct CancelJobRequest {
    #[serde(default, alias = "jobId")]
    pub job_id: Option<Uuid>,
}

/// POST /api/process/cancel response
#[derive(Debug, Serialize, Deserialize)]
pub struct CancelJobResponse {
    pub success: bool,
    pub message: String,
}

/// POST /api/process/start
///
/// Validates the submission and starts the analysis in the background.
/// Returns 202 Accepted with the job ID.
pub async fn start_job(
    State(state): State<AppState>,
    Json(input): Json<JobInput>,
) -> ApiResult<(StatusCode, Json<StartJobResponse>)> {
    let job_id = state.orchestrator.create_job(input)?;

    tracing::info!(job_id = %job_id, "Analysis job accepted");

    Ok((StatusCode::ACCEPTED, Json(StartJobResponse { job_id })))
}

/// GET /api/process/status/:job_id
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<JobStatusResponse>> {
    let job = state
        .orchestrator
        .get_job(job_id)
        .ok_or_else(|| ApiError::NotFound(format!("Job not found: {}", job_id)))?;

    tracing::debug!(
        job_id = %job_id,
        status = job.status.as_str(),
        progress = job.progress,
        "Status query"
    );

    Ok(Json(JobStatusResponse::from(&job)))
}

/// POST /api/process/cancel
///
/// Unknown and already finished jobs are acknowledged with `success: false`.
pub async fn cancel_job(
    State(state): State<AppState>,
    Json(request): Json<CancelJobRequest>,
) -> ApiResult<Json<CancelJobResponse>> {
    let job_id = request
        .job_id
        .ok_or_else(|| ApiError::BadRequest("job_id is required".to_string()))?;

    let response = match state.orchestrator.cancel_job(job_id) {
        CancelOutcome::Cancelled => CancelJobResponse {
            success: true,
            message: "Cancellation requested.".to_string(),
        },
        CancelOutcome::AlreadyTerminal(status) => CancelJobResponse {
            success: false,
            message: format!("Job already {}.", status.as_str()),
        },
        CancelOutcome::NotFound => CancelJobResponse {
            success: false,
            message: "Job not found.".to_string(),
        },
    };

    Ok(Json(response))
}

/// Build analysis job routes
pub fn process_routes() -> Router<AppState> {
    Router::new()
        .route("/api/process/start", post(start_job))
        .route("/api/process/status/:job_id", get(get_job_status))
        .route("/api/process/cancel", post(cancel_job))
}
