//! In-memory job registry
//!
//! The only shared mutable state of the service. Every access goes through a
//! short critical section on a `std::sync::RwLock`; no lock is held across an
//! `.await`.
//!
//! Each entry keeps the job record, the job's cancellation token and the
//! supervisor task handle. Jobs are never evicted.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tphysio_common::events::{EventBus, TphysioEvent};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::models::{Job, JobStatus};

struct JobEntry {
    job: Job,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

/// Result of a cancel request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Job moved to `cancelled` and its token was tripped
    Cancelled,
    /// Job had already finished with this status
    AlreadyTerminal(JobStatus),
    NotFound,
}

/// Shared job registry
#[derive(Clone, Default)]
pub struct JobStore {
    inner: Arc<RwLock<HashMap<Uuid, JobEntry>>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave a half-written Job behind,
    // so a poisoned map is still consistent.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<Uuid, JobEntry>> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Uuid, JobEntry>> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a new job with its cancellation token
    pub fn insert(&self, job: Job, cancel: CancellationToken) {
        self.write().insert(
            job.id,
            JobEntry {
                job,
                cancel,
                task: None,
            },
        );
    }

    /// Retain the supervisor handle of a job's background task
    pub fn attach_task(&self, id: Uuid, task: JoinHandle<()>) {
        if let Some(entry) = self.write().get_mut(&id) {
            entry.task = Some(task);
        }
    }

    /// Take the supervisor handle out, e.g. to await the job
    pub fn take_task(&self, id: Uuid) -> Option<JoinHandle<()>> {
        self.write().get_mut(&id).and_then(|entry| entry.task.take())
    }

    /// Snapshot of a job
    pub fn get(&self, id: Uuid) -> Option<Job> {
        self.read().get(&id).map(|entry| entry.job.clone())
    }

    /// Mutate a job atomically; `None` if the job does not exist
    pub fn update<F, R>(&self, id: Uuid, f: F) -> Option<R>
    where
        F: FnOnce(&mut Job) -> R,
    {
        self.write().get_mut(&id).map(|entry| f(&mut entry.job))
    }

    pub fn cancel_token(&self, id: Uuid) -> Option<CancellationToken> {
        self.read().get(&id).map(|entry| entry.cancel.clone())
    }

    /// Mark a job cancelled and trip its token
    pub fn cancel(&self, id: Uuid) -> CancelOutcome {
        let mut jobs = self.write();
        let Some(entry) = jobs.get_mut(&id) else {
            return CancelOutcome::NotFound;
        };

        if !entry.job.request_cancel() {
            return CancelOutcome::AlreadyTerminal(entry.job.status);
        }
        entry.cancel.cancel();
        CancelOutcome::Cancelled
    }

    /// Trip every job's token (shutdown)
    pub fn cancel_all(&self) -> usize {
        let jobs = self.read();
        let mut tripped = 0;
        for entry in jobs.values().filter(|e| !e.job.is_terminal()) {
            entry.cancel.cancel();
            tripped += 1;
        }
        tripped
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Number of jobs that have not reached a terminal status
    pub fn active_count(&self) -> usize {
        self.read().values().filter(|e| !e.job.is_terminal()).count()
    }
}

/// A pipeline's view of its own job
///
/// Stages report progress and observe cancellation through this handle; they
/// never touch the store directly.
#[derive(Clone)]
pub struct JobHandle {
    job_id: Uuid,
    store: JobStore,
    events: EventBus,
    cancel: CancellationToken,
}

impl JobHandle {
    pub fn new(job_id: Uuid, store: JobStore, events: EventBus, cancel: CancellationToken) -> Self {
        Self {
            job_id,
            store,
            events,
            cancel,
        }
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
            || self
                .store
                .get(self.job_id)
                .map_or(true, |job| job.cancel_requested)
    }

    /// `Err(Cancelled)` once cancellation was requested
    pub fn checkpoint(&self) -> Result<(), PipelineError> {
        if self.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        Ok(())
    }

    /// Move to the next status and raise progress
    ///
    /// Fails with `Cancelled` when the job was finished behind the pipeline's
    /// back, which can only be a cancellation.
    pub fn advance(
        &self,
        status: JobStatus,
        progress: u8,
        message: impl Into<String>,
    ) -> Result<(), PipelineError> {
        let message = message.into();
        let applied = self
            .store
            .update(self.job_id, |job| {
                if job.cancel_requested || job.transition_to(status).is_none() {
                    return false;
                }
                job.update_progress(progress, message);
                true
            })
            .unwrap_or(false);

        if !applied {
            return Err(PipelineError::Cancelled);
        }
        self.publish();
        Ok(())
    }

    /// Raise progress within the current status
    pub fn progress(&self, progress: u8, message: impl Into<String>) {
        let message = message.into();
        self.store
            .update(self.job_id, |job| job.update_progress(progress, message));
        self.publish();
    }

    /// Replace the message without touching progress
    pub fn message(&self, message: impl Into<String>) {
        let message = message.into();
        self.store
            .update(self.job_id, |job| job.update_message(message));
        self.publish();
    }

    fn publish(&self) {
        let Some(job) = self.store.get(self.job_id) else {
            return;
        };
        if job.is_terminal() {
            return;
        }
        self.events.emit_lossy(TphysioEvent::JobProgress {
            job_id: self.job_id,
            status: job.status.as_str().to_string(),
            progress: job.progress,
            message: job.message,
            timestamp: chrono::Utc::now(),
        });
    }
}
