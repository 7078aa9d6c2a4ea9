//! Error types for tphysio-ai
//!
//! `PipelineError` covers everything a job can fail with; `ApiError` is what
//! HTTP handlers return.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::types::ProviderError;

/// User-facing message when every model tier is exhausted
pub const HIGH_DEMAND_MESSAGE: &str =
    "The AI service is experiencing high demand. Please try again later.";

/// Failure of a job's pipeline
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Missing or inconsistent input, rejected before a job exists
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Provider still failing after its retries
    #[error("{stage} failed: {source}")]
    Provider {
        stage: &'static str,
        #[source]
        source: ProviderError,
    },

    /// Elevation results do not line up with the requested points
    #[error("Elevation merge rejected: expected {expected} values, received {actual}")]
    MergeInvariant { expected: usize, actual: usize },

    /// Elevation backfill needed but no point carries coordinates
    #[error("Elevation lookup impossible: no point has coordinates")]
    NoCoordinates,

    /// Cooperative early exit, not recorded as a failure
    #[error("Job cancelled")]
    Cancelled,

    /// All model tiers exhausted
    #[error("{}", HIGH_DEMAND_MESSAGE)]
    AnalysisUnavailable,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Cancelled)
    }
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// tphysio-common error
    #[error("Common error: {0}")]
    Common(#[from] tphysio_common::Error),
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Validation(msg) => ApiError::BadRequest(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiError::Common(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "COMMON_ERROR",
                err.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_maps_to_bad_request() {
        let api: ApiError = PipelineError::Validation("no max HR".to_string()).into();
        assert_eq!(api.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_exhaustion_message_is_user_facing() {
        assert_eq!(PipelineError::AnalysisUnavailable.to_string(), HIGH_DEMAND_MESSAGE);
    }

    #[test]
    fn test_merge_invariant_message_names_counts() {
        let err = PipelineError::MergeInvariant { expected: 250, actual: 249 };
        let text = err.to_string();
        assert!(text.contains("250") && text.contains("249"));
    }
}
