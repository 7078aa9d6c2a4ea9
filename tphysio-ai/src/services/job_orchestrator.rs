//! Job orchestration
//!
//! Owns the job registry and drives each job through
//! enrichment → metrics → analysis → completion in its own tokio task.
//!
//! **Supervision:** every pipeline task is awaited by a supervisor task which
//! records the outcome on the job. A pipeline error or panic becomes
//! `failed`; a cancellation is never recorded as a failure, and a job that
//! was cancelled keeps its `cancelled` status whatever the pipeline returns
//! afterwards.

use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tphysio_common::config::PipelineConfig;
use tphysio_common::events::{EventBus, TphysioEvent};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::models::{Job, JobInput, JobResult, JobStatus, TrainingData};
use crate::services::analysis::AnalysisStage;
use crate::services::enrichment::{EnrichmentStage, PROGRESS_ENRICHING};
use crate::services::job_store::{CancelOutcome, JobHandle, JobStore};
use crate::services::metrics_engine::MetricsEngine;
use crate::services::prompt::PromptBuilder;
use crate::types::{ElevationProvider, TextGenerator, WeatherProvider};
use crate::utils::retry::RetryPolicy;

const PROGRESS_ENRICHED: u8 = 60;
const PROGRESS_METRICS: u8 = 70;

/// Creates, tracks and cancels analysis jobs
#[derive(Clone)]
pub struct JobOrchestrator {
    store: JobStore,
    events: EventBus,
    enrichment: Arc<EnrichmentStage>,
    analysis: Arc<AnalysisStage>,
    metrics: MetricsEngine,
}

impl JobOrchestrator {
    pub fn new(enrichment: EnrichmentStage, analysis: AnalysisStage, events: EventBus) -> Self {
        Self {
            store: JobStore::new(),
            events,
            enrichment: Arc::new(enrichment),
            analysis: Arc::new(analysis),
            metrics: MetricsEngine::new(),
        }
    }

    /// Wire the stages from providers and pipeline settings
    pub fn from_providers(
        weather: Arc<dyn WeatherProvider>,
        elevation: Arc<dyn ElevationProvider>,
        generator: Arc<dyn TextGenerator>,
        config: &PipelineConfig,
        events: EventBus,
    ) -> Self {
        let enrichment = EnrichmentStage::new(weather, elevation, config);
        let analysis = AnalysisStage::new(
            generator,
            config.model_tiers.clone(),
            RetryPolicy::new(config.analysis_max_attempts, config.backoff_base_secs),
        );
        Self::new(enrichment, analysis, events)
    }

    /// Validate `input`, register a job and start its pipeline
    ///
    /// Returns as soon as the pipeline is spawned. Invalid input is rejected
    /// here and never becomes a job.
    pub fn create_job(&self, input: JobInput) -> Result<Uuid, PipelineError> {
        input.validate()?;

        let job_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let point_count = input.training_data.time_series.len();

        self.store.insert(Job::new(job_id), cancel.clone());
        self.events.emit_lossy(TphysioEvent::JobCreated {
            job_id,
            point_count,
            timestamp: Utc::now(),
        });
        info!(job_id = %job_id, points = point_count, "Analysis job created");

        let handle = JobHandle::new(job_id, self.store.clone(), self.events.clone(), cancel);
        let pipeline_self = self.clone();
        let pipeline = tokio::spawn(async move {
            debug!(job_id = %job_id, "Pipeline task started");
            pipeline_self.run_pipeline(input, &handle).await
        });

        let supervisor_self = self.clone();
        let supervisor = tokio::spawn(async move {
            supervisor_self.supervise(job_id, pipeline).await;
        });
        self.store.attach_task(job_id, supervisor);

        Ok(job_id)
    }

    /// Current snapshot of a job
    pub fn get_job(&self, job_id: Uuid) -> Option<Job> {
        self.store.get(job_id)
    }

    /// Request cancellation; the pipeline stops at its next checkpoint
    pub fn cancel_job(&self, job_id: Uuid) -> CancelOutcome {
        let outcome = self.store.cancel(job_id);
        match outcome {
            CancelOutcome::Cancelled => {
                info!(job_id = %job_id, "Job cancelled by user");
                self.events.emit_lossy(TphysioEvent::JobCancelled {
                    job_id,
                    timestamp: Utc::now(),
                });
            }
            CancelOutcome::AlreadyTerminal(status) => {
                debug!(
                    job_id = %job_id,
                    status = status.as_str(),
                    "Cancel ignored, job already finished"
                );
            }
            CancelOutcome::NotFound => {
                debug!(job_id = %job_id, "Cancel ignored, unknown job");
            }
        }
        outcome
    }

    /// Wait for a job's pipeline to finish and return the final snapshot
    ///
    /// Only the first caller waits; later callers get the current snapshot.
    pub async fn wait_for(&self, job_id: Uuid) -> Option<Job> {
        if let Some(task) = self.store.take_task(job_id) {
            if let Err(e) = task.await {
                warn!(job_id = %job_id, error = %e, "Supervisor task did not finish cleanly");
            }
        }
        self.store.get(job_id)
    }

    /// Total jobs held in memory
    pub fn job_count(&self) -> usize {
        self.store.len()
    }

    pub fn active_job_count(&self) -> usize {
        self.store.active_count()
    }

    /// Trip the cancellation token of every unfinished job
    pub fn shutdown(&self) {
        let tripped = self.store.cancel_all();
        if tripped > 0 {
            info!(jobs = tripped, "Cancelling unfinished jobs for shutdown");
        }
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.events
    }

    async fn run_pipeline(
        &self,
        input: JobInput,
        handle: &JobHandle,
    ) -> Result<JobResult, PipelineError> {
        let job_id = handle.job_id();
        let JobInput {
            form_data,
            training_data: TrainingData {
                summary,
                time_series,
            },
        } = input;

        // Enrichment
        handle.advance(
            JobStatus::Enriching,
            PROGRESS_ENRICHING,
            "Enriching data with weather and elevation...",
        )?;
        let enriched = self.enrichment.run(time_series, handle).await?;

        // Metrics
        handle.advance(
            JobStatus::Analyzing,
            PROGRESS_ENRICHED,
            "Data enriched, requesting AI analysis",
        )?;
        let engine = self.metrics.clone();
        let profile = form_data.profile.clone();
        let series = enriched.time_series;
        let (series, metrics) = tokio::task::spawn_blocking(move || {
            let metrics = engine.compute(&series, &profile);
            (series, metrics)
        })
        .await
        .map_err(|e| PipelineError::Internal(format!("Metrics computation failed: {}", e)))?;

        handle.checkpoint()?;
        handle.progress(PROGRESS_METRICS, "Metrics computed, generating analysis...");
        debug!(
            job_id = %job_id,
            insufficient = metrics.insufficient_data,
            cadence_estimated = metrics.is_cadence_estimated,
            "Metrics computed"
        );

        // Analysis
        let prompt = PromptBuilder::new(Utc::now().date_naive()).build(
            &form_data,
            &summary,
            enriched.weather.as_ref(),
            &metrics,
        );
        let analysis = self.analysis.run(&prompt, handle).await?;
        handle.checkpoint()?;

        Ok(JobResult {
            analysis_text: analysis.text,
            model: analysis.model,
            decoupling_chart_data: metrics.decoupling.trend.clone(),
            metrics,
            enriched_time_series: series,
            weather_info: enriched.weather,
        })
    }

    async fn supervise(
        &self,
        job_id: Uuid,
        pipeline: JoinHandle<Result<JobResult, PipelineError>>,
    ) {
        let outcome = match pipeline.await {
            Ok(outcome) => outcome,
            Err(join_error) if join_error.is_panic() => {
                let detail = panic_message(join_error.into_panic());
                error!(job_id = %job_id, panic = %detail, "Pipeline task panicked");
                Err(PipelineError::Internal(format!("Pipeline panicked: {}", detail)))
            }
            Err(join_error) => Err(PipelineError::Internal(format!(
                "Pipeline task aborted: {}",
                join_error
            ))),
        };

        match outcome {
            Ok(result) => self.record_completion(job_id, result),
            Err(e) if e.is_cancelled() => self.record_cancellation(job_id),
            Err(e) => self.record_failure(job_id, e),
        }
    }

    fn record_completion(&self, job_id: Uuid, result: JobResult) {
        let applied = self.store.update(job_id, |job| {
            if job.complete(result) {
                Some(duration_ms(job))
            } else {
                None
            }
        });

        match applied.flatten() {
            Some(duration_ms) => {
                info!(job_id = %job_id, duration_ms, "Analysis job completed");
                self.events.emit_lossy(TphysioEvent::JobCompleted {
                    job_id,
                    duration_ms,
                    timestamp: Utc::now(),
                });
            }
            None => debug!(job_id = %job_id, "Discarding result of a job that already finished"),
        }
    }

    fn record_cancellation(&self, job_id: Uuid) {
        // Shutdown trips the token without marking the job; finish it here.
        if self.store.cancel(job_id) == CancelOutcome::Cancelled {
            self.events.emit_lossy(TphysioEvent::JobCancelled {
                job_id,
                timestamp: Utc::now(),
            });
        }
        info!(job_id = %job_id, "Pipeline stopped after cancellation");
    }

    fn record_failure(&self, job_id: Uuid, err: PipelineError) {
        let error_text = err.to_string();
        error!(job_id = %job_id, error = %error_text, "Analysis job failed");

        let applied = self
            .store
            .update(job_id, |job| job.fail(error_text.clone()))
            .unwrap_or(false);

        if applied {
            self.events.emit_lossy(TphysioEvent::JobFailed {
                job_id,
                error: error_text,
                timestamp: Utc::now(),
            });
        } else {
            debug!(job_id = %job_id, "Failure not recorded, job already finished");
        }
    }
}

fn duration_ms(job: &Job) -> u64 {
    let end = job.ended_at.unwrap_or_else(Utc::now);
    (end - job.created_at).num_milliseconds().max(0) as u64
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
