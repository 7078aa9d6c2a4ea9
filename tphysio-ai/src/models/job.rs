//! Analysis job state machine
//!
//! created → enriching → analyzing → completed | failed | cancelled
//!
//! Transitions only move forward and terminal states are sticky.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::metrics::{DecouplingPoint, DerivedMetrics};
use super::training::TimeSeriesPoint;
use super::weather::WeatherInfo;

/// Job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Accepted, pipeline not yet started
    Created,
    /// Weather lookup and elevation backfill
    Enriching,
    /// Metrics derivation and AI report generation
    Analyzing,
    /// Report available in `result`
    Completed,
    /// Pipeline error recorded in `error`
    Failed,
    /// Cancelled by the caller
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Created => 0,
            Self::Enriching => 1,
            Self::Analyzing => 2,
            Self::Completed | Self::Failed | Self::Cancelled => 3,
        }
    }

    /// Lower-case name, as on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Enriching => "enriching",
            Self::Analyzing => "analyzing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Record of an applied status change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub job_id: Uuid,
    pub old_status: JobStatus,
    pub new_status: JobStatus,
    pub transitioned_at: DateTime<Utc>,
}

/// Payload stored on a completed job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub analysis_text: String,
    /// Model tier that produced `analysis_text`
    pub model: String,
    pub decoupling_chart_data: Vec<DecouplingPoint>,
    pub metrics: DerivedMetrics,
    pub enriched_time_series: Vec<TimeSeriesPoint>,
    pub weather_info: Option<WeatherInfo>,
}

/// One analysis request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: Uuid,
    pub status: JobStatus,
    /// 0-100, non-decreasing until terminal
    pub progress: u8,
    pub message: String,
    pub result: Option<JobResult>,
    pub error: Option<String>,
    pub cancel_requested: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: JobStatus::Created,
            progress: 0,
            message: "Job created. Waiting for processing...".to_string(),
            result: None,
            error: None,
            cancel_requested: false,
            created_at: now,
            updated_at: now,
            ended_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether `new_status` is a legal forward move from the current status
    pub fn can_transition_to(&self, new_status: JobStatus) -> bool {
        !self.is_terminal() && new_status.rank() > self.status.rank()
    }

    /// Transition to a new status; `None` when the move is not allowed
    pub fn transition_to(&mut self, new_status: JobStatus) -> Option<StateTransition> {
        if !self.can_transition_to(new_status) {
            return None;
        }

        let transition = StateTransition {
            job_id: self.id,
            old_status: self.status,
            new_status,
            transitioned_at: Utc::now(),
        };
        self.status = new_status;
        self.updated_at = transition.transitioned_at;

        if new_status.is_terminal() {
            self.ended_at = Some(transition.transitioned_at);
        }

        Some(transition)
    }

    /// Raise progress (never lowers it) and replace the message
    pub fn update_progress(&mut self, progress: u8, message: impl Into<String>) {
        if self.is_terminal() {
            return;
        }
        self.progress = self.progress.max(progress.min(100));
        self.message = message.into();
        self.updated_at = Utc::now();
    }

    /// Replace the message only
    pub fn update_message(&mut self, message: impl Into<String>) {
        if self.is_terminal() {
            return;
        }
        self.message = message.into();
        self.updated_at = Utc::now();
    }

    /// Mark cancelled from the caller's side; returns false if already terminal
    pub fn request_cancel(&mut self) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.cancel_requested = true;
        self.transition_to(JobStatus::Cancelled);
        self.message = "Job cancelled by user.".to_string();
        true
    }

    pub fn complete(&mut self, result: JobResult) -> bool {
        if self.transition_to(JobStatus::Completed).is_none() {
            return false;
        }
        self.progress = 100;
        self.message = "Analysis completed successfully!".to_string();
        self.result = Some(result);
        true
    }

    pub fn fail(&mut self, error: impl Into<String>) -> bool {
        if self.transition_to(JobStatus::Failed).is_none() {
            return false;
        }
        self.message = "An error occurred during processing.".to_string();
        self.error = Some(error.into());
        true
    }
}

/// GET status response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusResponse {
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    pub result: Option<JobResult>,
    pub error: Option<String>,
}

impl From<&Job> for JobStatusResponse {
    fn from(job: &Job) -> Self {
        Self {
            status: job.status,
            progress: job.progress,
            message: job.message.clone(),
            result: job.result.clone(),
            error: job.error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions_only() {
        let mut job = Job::new(Uuid::new_v4());
        assert!(job.transition_to(JobStatus::Enriching).is_some());
        assert!(job.transition_to(JobStatus::Created).is_none());
        assert!(job.transition_to(JobStatus::Enriching).is_none());

        let transition = job.transition_to(JobStatus::Analyzing).unwrap();
        assert_eq!(transition.old_status, JobStatus::Enriching);
        assert_eq!(transition.new_status, JobStatus::Analyzing);
        assert!(job.ended_at.is_none());
    }

    #[test]
    fn test_terminal_state_is_sticky() {
        let mut job = Job::new(Uuid::new_v4());
        assert!(job.request_cancel());
        assert_eq!(job.status, JobStatus::Cancelled);
        assert!(job.cancel_requested);
        assert!(job.ended_at.is_some());

        assert!(!job.fail("late failure"));
        assert!(job.error.is_none());
        assert!(!job.request_cancel());
        assert_eq!(job.status, JobStatus::Cancelled);
    }

    #[test]
    fn test_progress_never_decreases() {
        let mut job = Job::new(Uuid::new_v4());
        job.update_progress(60, "enriched");
        job.update_progress(10, "stale update");
        assert_eq!(job.progress, 60);
        assert_eq!(job.message, "stale update");
        job.update_progress(250, "clamped");
        assert_eq!(job.progress, 100);
    }

    #[test]
    fn test_fail_records_error() {
        let mut job = Job::new(Uuid::new_v4());
        job.transition_to(JobStatus::Enriching);
        assert!(job.fail("elevation unavailable"));
        let response = JobStatusResponse::from(&job);
        assert_eq!(response.status, JobStatus::Failed);
        assert_eq!(response.error.as_deref(), Some("elevation unavailable"));
        assert!(response.result.is_none());

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "failed");
        assert!(json["result"].is_null());
    }
}
