//! Integration tests for concurrent job access
//!
//! Many jobs run side by side on a multi-threaded runtime while callers poll
//! and cancel them.

mod helpers;

use std::collections::HashSet;

use helpers::*;
use tokio::task::JoinSet;
use tphysio_ai::models::JobStatus;
use tphysio_ai::services::CancelOutcome;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_jobs_are_isolated() {
    let orchestrator = orchestrator(
        FakeWeather::sunny(),
        FakeElevation::accurate(),
        ScriptedGenerator::answering("tier-a", "ok"),
        &fast_config(),
    );

    let mut join_set = JoinSet::new();
    for i in 0..20 {
        let orchestrator = orchestrator.clone();
        join_set.spawn(async move {
            // Odd jobs need elevation, even jobs carry altitude
            let altitude = if i % 2 == 0 { Some(600.0) } else { None };
            let job_id = orchestrator
                .create_job(sample_input(sample_series(150, altitude)))
                .unwrap();
            let job = orchestrator.wait_for(job_id).await.unwrap();
            (job_id, job)
        });
    }

    let mut ids = HashSet::new();
    while let Some(result) = join_set.join_next().await {
        let (job_id, job) = result.expect("Task panicked");
        assert_eq!(job.id, job_id);
        assert_eq!(job.status, JobStatus::Completed, "job {} did not complete", job_id);
        assert_eq!(job.result.unwrap().enriched_time_series.len(), 150);
        ids.insert(job_id);
    }

    assert_eq!(ids.len(), 20);
    assert_eq!(orchestrator.job_count(), 20);
    assert_eq!(orchestrator.active_job_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_cancel_and_poll() {
    let orchestrator = orchestrator(
        FakeWeather::sunny(),
        FakeElevation::slow(std::time::Duration::from_millis(20)),
        ScriptedGenerator::answering("tier-a", "ok"),
        &fast_config(),
    );

    let job_id = orchestrator
        .create_job(sample_input(sample_series(2000, None)))
        .unwrap();

    let mut join_set = JoinSet::new();
    for _ in 0..5 {
        let orchestrator = orchestrator.clone();
        join_set.spawn(async move {
            let mut last_progress = 0;
            for _ in 0..20 {
                let job = orchestrator.get_job(job_id).unwrap();
                assert!(job.progress >= last_progress);
                last_progress = job.progress;
                tokio::task::yield_now().await;
            }
        });
    }
    {
        let orchestrator = orchestrator.clone();
        join_set.spawn(async move {
            let outcome = orchestrator.cancel_job(job_id);
            assert!(matches!(
                outcome,
                CancelOutcome::Cancelled | CancelOutcome::AlreadyTerminal(_)
            ));
        });
    }

    while let Some(result) = join_set.join_next().await {
        result.expect("Task panicked");
    }

    let job = orchestrator.wait_for(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert!(job.result.is_none());
}
