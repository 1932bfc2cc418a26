//! One claim-validate-execute-record iteration of the worker loop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use pipeline_core::{
    FailureKind, Job, JobEvent, JobFailure, JobId, JobStore, PipelineError, StageResult, StageTable,
};
use tokio::sync::broadcast;

use crate::handler::run_stage;

/// Outcome of a single dispatcher iteration.
#[derive(Debug, Clone, PartialEq)]
pub enum Tick {
    /// Nothing was pending.
    Idle,
    /// A job ran and was recorded as complete.
    Completed(JobId),
    /// A job was recorded as failed.
    Failed(JobId, FailureKind),
    /// The store could not be reached or refused a transition; no job state
    /// was changed by this worker.
    StoreError(PipelineError),
}

impl Tick {
    /// Whether the worker should wait before the next iteration.
    pub fn should_back_off(&self) -> bool {
        match self {
            Tick::Idle => true,
            Tick::StoreError(err) => err.is_transient(),
            Tick::Completed(_) | Tick::Failed(..) => false,
        }
    }
}

/// Drives jobs from a store through the stage table.
pub struct Dispatcher<S> {
    worker_id: String,
    store: Arc<S>,
    stages: Arc<StageTable>,
    stage_timeout: Option<Duration>,
    event_tx: Option<broadcast::Sender<JobEvent>>,
}

impl<S: JobStore> Dispatcher<S> {
    pub fn new(worker_id: impl Into<String>, store: Arc<S>, stages: Arc<StageTable>) -> Self {
        Self {
            worker_id: worker_id.into(),
            store,
            stages,
            stage_timeout: None,
            event_tx: None,
        }
    }

    /// Fail handlers that run longer than `timeout`.
    pub fn with_stage_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stage_timeout = timeout;
        self
    }

    /// Set the event broadcaster.
    pub fn with_event_tx(mut self, tx: broadcast::Sender<JobEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Claim at most one job and drive it to a terminal state.
    ///
    /// Per-job problems are recorded on the job. Store problems are
    /// returned as [`Tick::StoreError`] and never recorded as job failures.
    pub async fn tick(&self) -> Tick {
        let job = match self.store.claim_next(&self.worker_id).await {
            Ok(Some(job)) => job,
            Ok(None) => return Tick::Idle,
            Err(err) => {
                tracing::warn!(worker_id = %self.worker_id, error = %err, "Failed to claim job");
                self.emit(JobEvent::StoreUnavailable {
                    worker_id: self.worker_id.clone(),
                    error: err.to_string(),
                    timestamp: Utc::now(),
                });
                return Tick::StoreError(err);
            }
        };

        tracing::info!(
            worker_id = %self.worker_id,
            job_id = %job.id,
            job_type = %job.job_type,
            "Processing job"
        );
        self.emit(JobEvent::JobStarted {
            job_id: job.id,
            job_type: job.job_type.clone(),
            worker_id: self.worker_id.clone(),
            timestamp: Utc::now(),
        });

        let started = Instant::now();
        match self.execute(&job).await {
            Ok(result) => {
                let summary = result.summary();
                match self.store.complete(job.id, result).await {
                    Ok(_) => {
                        let duration_ms = started.elapsed().as_millis() as u64;
                        tracing::info!(
                            worker_id = %self.worker_id,
                            job_id = %job.id,
                            duration_ms,
                            "Job completed: {}",
                            summary
                        );
                        self.emit(JobEvent::JobCompleted {
                            job_id: job.id,
                            worker_id: self.worker_id.clone(),
                            duration_ms,
                            timestamp: Utc::now(),
                        });
                        Tick::Completed(job.id)
                    }
                    Err(err) => self.record_error(&job, err),
                }
            }
            Err(err) => {
                let failure = JobFailure::from_error(&err);
                tracing::warn!(
                    worker_id = %self.worker_id,
                    job_id = %job.id,
                    kind = %failure.kind,
                    "Job failed: {}",
                    failure.message
                );
                match self.store.fail(job.id, failure.clone()).await {
                    Ok(_) => {
                        self.emit(JobEvent::JobFailed {
                            job_id: job.id,
                            worker_id: self.worker_id.clone(),
                            kind: failure.kind,
                            error: failure.message,
                            timestamp: Utc::now(),
                        });
                        Tick::Failed(job.id, failure.kind)
                    }
                    Err(err) => self.record_error(&job, err),
                }
            }
        }
    }

    /// Validation runs before the handler; a job that fails it never executes.
    async fn execute(&self, job: &Job) -> Result<StageResult, PipelineError> {
        let params = job.stage_params()?;
        run_stage(&self.stages, job.id, &params, self.stage_timeout).await
    }

    fn record_error(&self, job: &Job, err: PipelineError) -> Tick {
        if err.is_transient() {
            tracing::error!(
                worker_id = %self.worker_id,
                job_id = %job.id,
                error = %err,
                "Could not record job outcome; job stays running"
            );
            self.emit(JobEvent::StoreUnavailable {
                worker_id: self.worker_id.clone(),
                error: err.to_string(),
                timestamp: Utc::now(),
            });
        } else {
            tracing::warn!(
                worker_id = %self.worker_id,
                job_id = %job.id,
                error = %err,
                "Job outcome rejected by store"
            );
        }
        Tick::StoreError(err)
    }

    fn emit(&self, event: JobEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event);
        }
    }
}
