//! SurrealDB implementations of the pipeline collaborator traits.

use std::sync::Arc;

use chrono::Utc;
use pipeline_core::{
    BoxFuture, CredentialStore, FailureKind, Job, JobFailure, JobFilter, JobId, JobStatus,
    JobStore, JobType, PipelineError, ResultSink, Secret, StageResult,
};
use tokio::sync::Mutex;

use crate::repositories::{CredentialRepository, JobRepository, ResultRepository};
use crate::vault::CredentialVault;

/// Durable job store backed by the global SurrealDB connection.
///
/// Claims are serialized within the process; the guarded update in
/// [`JobRepository::claim_next`] keeps claims exclusive across processes.
#[derive(Clone)]
pub struct SurrealJobStore {
    claim_lock: Arc<Mutex<()>>,
    sink: Arc<dyn ResultSink>,
}

impl Default for SurrealJobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SurrealJobStore {
    /// Store that records results in the `stage_result` table.
    pub fn new() -> Self {
        Self {
            claim_lock: Arc::new(Mutex::new(())),
            sink: Arc::new(SurrealResultSink),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sink = sink;
        self
    }
}

impl JobStore for SurrealJobStore {
    async fn insert(&self, job: Job) -> Result<Job, PipelineError> {
        let job = JobRepository::create(&job).await?;
        tracing::debug!("Persisted job {} ({})", job.id, job.job_type);
        Ok(job)
    }

    async fn claim_next(&self, worker_id: &str) -> Result<Option<Job>, PipelineError> {
        let _guard = self.claim_lock.lock().await;
        Ok(JobRepository::claim_next(worker_id).await?)
    }

    async fn complete(&self, id: JobId, result: StageResult) -> Result<Job, PipelineError> {
        let job = JobRepository::mark_complete(id, &result)
            .await?
            .ok_or(PipelineError::DoubleTransition(id))?;

        if let Ok(job_type) = job.stage()
            && let Err(e) = self.sink.persist(id, job_type, &result).await
        {
            tracing::warn!("Result sink rejected job {}: {}", id, e);
        }

        Ok(job)
    }

    async fn fail(&self, id: JobId, failure: JobFailure) -> Result<Job, PipelineError> {
        JobRepository::mark_failed(id, &failure)
            .await?
            .ok_or(PipelineError::DoubleTransition(id))
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>, PipelineError> {
        Ok(JobRepository::get(id).await?)
    }

    async fn list(&self, filter: JobFilter) -> Result<Vec<Job>, PipelineError> {
        Ok(JobRepository::list(&filter).await?)
    }

    async fn fail_orphans(
        &self,
        stale_after: chrono::Duration,
    ) -> Result<Vec<JobId>, PipelineError> {
        let cutoff = Utc::now() - stale_after;
        let running = JobFilter::default().with_status(JobStatus::Running);
        let running = JobRepository::list(&running).await?;

        let mut failed = Vec::new();
        for job in running {
            if !job.started_at.is_some_and(|started| started <= cutoff) {
                continue;
            }
            let failure = JobFailure::new(
                FailureKind::Orphaned,
                format!(
                    "worker {} stopped reporting",
                    job.worker_id.as_deref().unwrap_or("unknown")
                ),
            );
            // A job finishing concurrently wins; it is no longer an orphan.
            if JobRepository::mark_failed(job.id, &failure).await?.is_some() {
                failed.push(job.id);
            }
        }

        if !failed.is_empty() {
            tracing::warn!("Marked {} orphaned jobs as failed", failed.len());
        }
        Ok(failed)
    }
}

/// Result sink writing the `stage_result` table.
#[derive(Debug, Clone, Copy, Default)]
pub struct SurrealResultSink;

impl ResultSink for SurrealResultSink {
    fn persist<'a>(
        &'a self,
        job_id: JobId,
        job_type: JobType,
        result: &'a StageResult,
    ) -> BoxFuture<'a, Result<(), PipelineError>> {
        Box::pin(async move {
            ResultRepository::record(job_id, job_type, result).await?;
            tracing::debug!("Recorded {} result for job {}", job_type, job_id);
            Ok(())
        })
    }
}

/// Credential store keeping encrypted secrets in the `credential` table.
#[derive(Debug, Clone)]
pub struct SurrealCredentialStore {
    vault: CredentialVault,
}

impl SurrealCredentialStore {
    pub fn new(vault: CredentialVault) -> Self {
        Self { vault }
    }

    /// Encrypt and store a credential, replacing any previous value.
    pub async fn store_credential(
        &self,
        user_id: &str,
        provider: &str,
        secret: &str,
    ) -> Result<(), PipelineError> {
        let sealed = self.vault.encrypt(secret)?;
        CredentialRepository::put(user_id, provider, sealed).await?;
        tracing::info!(
            "Stored {} credential for user {} ({})",
            provider,
            user_id,
            pipeline_core::mask_secret(secret)
        );
        Ok(())
    }
}

impl CredentialStore for SurrealCredentialStore {
    fn get_credential<'a>(
        &'a self,
        user_id: &'a str,
        provider: &'a str,
    ) -> BoxFuture<'a, Result<Option<Secret>, PipelineError>> {
        Box::pin(async move {
            let Some(sealed) = CredentialRepository::get(user_id, provider).await? else {
                return Ok(None);
            };
            Ok(Some(self.vault.decrypt(&sealed)?))
        })
    }
}
