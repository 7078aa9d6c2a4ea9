//! Multi-tier analysis stage tests
//!
//! Backoff timing is checked with tokio's paused clock.

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use helpers::*;
use tokio_util::sync::CancellationToken;
use tphysio_ai::models::{Job, JobStatus};
use tphysio_ai::services::{AnalysisStage, JobHandle, JobStore};
use tphysio_ai::types::ProviderError;
use tphysio_ai::utils::RetryPolicy;
use tphysio_ai::PipelineError;
use tphysio_common::events::EventBus;
use uuid::Uuid;

fn tiers() -> Vec<String> {
    vec!["tier-a".to_string(), "tier-b".to_string(), "tier-c".to_string()]
}

fn job_handle() -> (JobStore, JobHandle) {
    let store = JobStore::new();
    let id = Uuid::new_v4();
    let cancel = CancellationToken::new();
    store.insert(Job::new(id), cancel.clone());
    let handle = JobHandle::new(id, store.clone(), EventBus::new(100), cancel);
    (store, handle)
}

/// TC-AN-001: Tier A fails 3× transient, tier B answers; tier C never tried
#[tokio::test(start_paused = true)]
async fn tc_an_001_falls_back_to_next_tier() {
    let generator = Arc::new(
        ScriptedGenerator::new()
            .then("tier-a", [transient(), transient(), transient()])
            .then("tier-b", [Ok("report from B".to_string())])
            .then("tier-c", [Ok("report from C".to_string())]),
    );
    let stage = AnalysisStage::new(generator.clone(), tiers(), RetryPolicy::new(3, 2));
    let (_store, handle) = job_handle();

    let start = tokio::time::Instant::now();
    let output = stage.run("prompt", &handle).await.unwrap();

    assert_eq!(output.text, "report from B");
    assert_eq!(output.model, "tier-b");
    assert_eq!(generator.calls_for("tier-a"), 3);
    assert_eq!(generator.calls_for("tier-b"), 1);
    assert_eq!(generator.calls_for("tier-c"), 0);
    // 2^1 + 2^2 seconds of backoff inside tier A, none when advancing
    assert_eq!(start.elapsed(), Duration::from_secs(6));
}

/// TC-AN-002: A permanent failure abandons the tier without backoff
#[tokio::test(start_paused = true)]
async fn tc_an_002_permanent_error_advances_immediately() {
    let generator = Arc::new(
        ScriptedGenerator::new()
            .then(
                "tier-a",
                [Err(ProviderError::Permanent("HTTP 404: model not found".to_string()))],
            )
            .then("tier-b", [Ok("report".to_string())]),
    );
    let stage = AnalysisStage::new(generator.clone(), tiers(), RetryPolicy::new(3, 2));
    let (_store, handle) = job_handle();

    let start = tokio::time::Instant::now();
    let output = stage.run("prompt", &handle).await.unwrap();

    assert_eq!(output.model, "tier-b");
    assert_eq!(generator.calls_for("tier-a"), 1);
    assert_eq!(start.elapsed(), Duration::ZERO);
}

/// TC-AN-003: Exhausting every tier yields AnalysisUnavailable
#[tokio::test(start_paused = true)]
async fn tc_an_003_all_tiers_exhausted() {
    let generator = Arc::new(
        ScriptedGenerator::new()
            .then("tier-a", [transient(), transient(), transient()])
            .then("tier-b", [transient(), Err(ProviderError::Permanent("HTTP 400".to_string()))]),
    );
    let stage = AnalysisStage::new(generator.clone(), tiers(), RetryPolicy::new(3, 2));
    let (_store, handle) = job_handle();

    let err = stage.run("prompt", &handle).await.unwrap_err();

    assert!(matches!(err, PipelineError::AnalysisUnavailable));
    assert_eq!(generator.calls_for("tier-b"), 2);
    // tier-c has no script and fails permanently on its first attempt
    assert_eq!(generator.calls_for("tier-c"), 1);
}

/// TC-AN-004: Attempts update the message but never the progress
#[tokio::test(start_paused = true)]
async fn tc_an_004_attempts_update_message_only() {
    let generator = Arc::new(
        ScriptedGenerator::new().then("tier-a", [transient(), Ok("done".to_string())]),
    );
    let stage = AnalysisStage::new(generator, tiers(), RetryPolicy::new(3, 2));
    let (store, handle) = job_handle();
    handle.advance(JobStatus::Analyzing, 70, "Metrics computed").unwrap();

    stage.run("prompt", &handle).await.unwrap();

    let job = store.get(handle.job_id()).unwrap();
    assert_eq!(job.progress, 70);
    assert!(job.message.contains("attempt 2/3"), "message was {:?}", job.message);
}

/// TC-AN-005: Cancellation during backoff stops the stage
#[tokio::test(start_paused = true)]
async fn tc_an_005_cancel_during_backoff() {
    let generator = Arc::new(
        ScriptedGenerator::new().then("tier-a", [transient(), Ok("too late".to_string())]),
    );
    let stage = AnalysisStage::new(generator.clone(), tiers(), RetryPolicy::new(3, 2));
    let (store, handle) = job_handle();
    let job_id = handle.job_id();

    let canceller = {
        let store = store.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            store.cancel(job_id);
        })
    };

    let err = stage.run("prompt", &handle).await.unwrap_err();
    canceller.await.unwrap();

    assert!(err.is_cancelled());
    assert_eq!(generator.calls_for("tier-a"), 1);
    assert_eq!(store.get(job_id).unwrap().status, JobStatus::Cancelled);
}
