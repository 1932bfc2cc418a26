//! Job store contract and the in-memory implementation.

use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;

use crate::{
    Job, JobFailure, JobId, JobStatus, LogResultSink, PipelineError, ResultSink, StageParams,
    StageResult,
};

/// Filter for listing jobs.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub job_type: Option<String>,
    pub limit: Option<usize>,
}

impl JobFilter {
    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_job_type(mut self, job_type: impl Into<String>) -> Self {
        self.job_type = Some(job_type.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, job: &Job) -> bool {
        self.status.is_none_or(|s| s == job.status)
            && self.job_type.as_deref().is_none_or(|t| t == job.job_type)
    }
}

/// Durable table of jobs; the single source of truth for pipeline state.
///
/// Every transition is a single-row guarded update:
/// `claim_next` requires `pending`, `complete` and `fail` require `running`.
pub trait JobStore: Send + Sync + 'static {
    /// Store a prepared pending job.
    fn insert(&self, job: Job) -> impl Future<Output = Result<Job, PipelineError>> + Send;

    /// Atomically claim the highest priority pending job, oldest first.
    fn claim_next(
        &self,
        worker_id: &str,
    ) -> impl Future<Output = Result<Option<Job>, PipelineError>> + Send;

    /// Transition a running job to `complete` and publish its result.
    fn complete(
        &self,
        id: JobId,
        result: StageResult,
    ) -> impl Future<Output = Result<Job, PipelineError>> + Send;

    /// Transition a running job to `failed`.
    fn fail(
        &self,
        id: JobId,
        failure: JobFailure,
    ) -> impl Future<Output = Result<Job, PipelineError>> + Send;

    fn get(&self, id: JobId) -> impl Future<Output = Result<Option<Job>, PipelineError>> + Send;

    fn list(&self, filter: JobFilter)
    -> impl Future<Output = Result<Vec<Job>, PipelineError>> + Send;

    /// Fail jobs that have been running longer than `stale_after`.
    fn fail_orphans(
        &self,
        stale_after: chrono::Duration,
    ) -> impl Future<Output = Result<Vec<JobId>, PipelineError>> + Send;

    /// Enqueue raw external input, validating known stages first.
    fn enqueue(
        &self,
        job_type: &str,
        params: serde_json::Value,
        priority: i64,
    ) -> impl Future<Output = Result<JobId, PipelineError>> + Send {
        let prepared = Job::submit(job_type, params, priority);
        async move {
            let job = self.insert(prepared?).await?;
            Ok(job.id)
        }
    }

    /// Enqueue typed parameters from an in-process producer.
    fn enqueue_stage(
        &self,
        params: StageParams,
        priority: i64,
    ) -> impl Future<Output = Result<JobId, PipelineError>> + Send {
        let prepared = params
            .validate()
            .map(|_| Job::from_stage(&params).with_priority(priority));
        async move {
            let job = self.insert(prepared?).await?;
            Ok(job.id)
        }
    }
}

/// Ordering key of the pending index: highest priority first, then id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct PendingKey {
    priority: Reverse<i64>,
    id: JobId,
}

impl PendingKey {
    fn of(job: &Job) -> Self {
        Self {
            priority: Reverse(job.priority),
            id: job.id,
        }
    }
}

#[derive(Default)]
struct MemoryState {
    jobs: HashMap<JobId, Job>,
    pending: BTreeSet<PendingKey>,
}

/// Process-local job store.
///
/// Claims pop the pending index under the same lock that flips the job
/// to `running`, so concurrent claimers never share a job.
#[derive(Clone)]
pub struct MemoryJobStore {
    state: Arc<Mutex<MemoryState>>,
    sink: Arc<dyn ResultSink>,
}

impl Default for MemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            sink: Arc::new(LogResultSink),
        }
    }

    /// Publish completed results to `sink` instead of the log.
    pub fn with_sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sink = sink;
        self
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, PipelineError> {
        self.state
            .lock()
            .map_err(|_| PipelineError::StoreUnavailable("job table lock poisoned".into()))
    }

    fn insert_sync(&self, job: Job) -> Result<Job, PipelineError> {
        let mut state = self.lock()?;
        if job.status == JobStatus::Pending {
            state.pending.insert(PendingKey::of(&job));
        }
        state.jobs.insert(job.id, job.clone());
        Ok(job)
    }

    fn claim_sync(&self, worker_id: &str) -> Result<Option<Job>, PipelineError> {
        let mut state = self.lock()?;
        let Some(key) = state.pending.pop_first() else {
            return Ok(None);
        };
        let job = state
            .jobs
            .get_mut(&key.id)
            .ok_or(PipelineError::JobNotFound(key.id))?;
        job.mark_running(worker_id, Utc::now())?;
        Ok(Some(job.clone()))
    }

    fn transition_sync(
        &self,
        id: JobId,
        apply: impl FnOnce(&mut Job) -> Result<(), PipelineError>,
    ) -> Result<Job, PipelineError> {
        let mut state = self.lock()?;
        let job = state
            .jobs
            .get_mut(&id)
            .ok_or(PipelineError::DoubleTransition(id))?;
        apply(job)?;
        Ok(job.clone())
    }

    fn fail_orphans_sync(
        &self,
        stale_after: chrono::Duration,
    ) -> Result<Vec<JobId>, PipelineError> {
        let now = Utc::now();
        let cutoff = now - stale_after;
        let mut state = self.lock()?;
        let mut failed = Vec::new();
        for job in state.jobs.values_mut() {
            let stale = job.status == JobStatus::Running
                && job.started_at.is_some_and(|started| started <= cutoff);
            if !stale {
                continue;
            }
            let message = format!(
                "worker {} stopped reporting",
                job.worker_id.as_deref().unwrap_or("unknown")
            );
            job.mark_failed(JobFailure::new(crate::FailureKind::Orphaned, message), now)?;
            failed.push(job.id);
        }
        failed.sort();
        Ok(failed)
    }
}

impl JobStore for MemoryJobStore {
    async fn insert(&self, job: Job) -> Result<Job, PipelineError> {
        let job = self.insert_sync(job)?;
        tracing::debug!("Inserted job {} ({})", job.id, job.job_type);
        Ok(job)
    }

    async fn claim_next(&self, worker_id: &str) -> Result<Option<Job>, PipelineError> {
        self.claim_sync(worker_id)
    }

    async fn complete(&self, id: JobId, result: StageResult) -> Result<Job, PipelineError> {
        let job = self.transition_sync(id, |job| job.mark_complete(result, Utc::now()))?;
        if let (Some(result), Ok(job_type)) = (job.result.as_ref(), job.stage())
            && let Err(e) = self.sink.persist(id, job_type, result).await
        {
            tracing::warn!("Result sink rejected job {}: {}", id, e);
        }
        Ok(job)
    }

    async fn fail(&self, id: JobId, failure: JobFailure) -> Result<Job, PipelineError> {
        self.transition_sync(id, |job| job.mark_failed(failure, Utc::now()))
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>, PipelineError> {
        Ok(self.lock()?.jobs.get(&id).cloned())
    }

    async fn list(&self, filter: JobFilter) -> Result<Vec<Job>, PipelineError> {
        let state = self.lock()?;
        let mut jobs: Vec<Job> = state
            .jobs
            .values()
            .filter(|job| filter.matches(job))
            .cloned()
            .collect();
        jobs.sort_by_key(|job| job.id);
        if let Some(limit) = filter.limit {
            jobs.truncate(limit);
        }
        Ok(jobs)
    }

    async fn fail_orphans(
        &self,
        stale_after: chrono::Duration,
    ) -> Result<Vec<JobId>, PipelineError> {
        let failed = self.fail_orphans_sync(stale_after)?;
        if !failed.is_empty() {
            tracing::warn!("Marked {} orphaned jobs as failed", failed.len());
        }
        Ok(failed)
    }
}
