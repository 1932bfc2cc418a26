//! Job domain types for pipeline work items.

use std::sync::{LazyLock, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::{Generator, Ulid};

use crate::error::PipelineError;
use crate::stage::{JobType, StageParams, StageResult};

/// Process-wide monotonic generator so that id order follows creation order.
static ID_GENERATOR: LazyLock<Mutex<Generator>> = LazyLock::new(|| Mutex::new(Generator::new()));

/// Unique identifier for a job.
///
/// Ids are monotonic ULIDs: within a process, a job created later always has
/// a greater id. Across processes they only order to the millisecond, so
/// durable stores break priority ties on `created_at` first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Ulid);

impl JobId {
    /// Create a new unique job ID.
    pub fn new() -> Self {
        let next = ID_GENERATOR
            .lock()
            .ok()
            .and_then(|mut generator| generator.generate().ok());
        Self(next.unwrap_or_else(Ulid::new))
    }

    /// Parse a job ID from a string.
    pub fn parse(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Current status of a job in its lifecycle.
///
/// `pending -> running -> {complete | failed}`; the last two are terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job is waiting to be claimed.
    #[default]
    Pending,
    /// Job is held by exactly one worker.
    Running,
    /// Job finished and its result was recorded.
    Complete,
    /// Job finished with a recorded failure.
    Failed,
}

impl JobStatus {
    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Failed)
    }

    /// Get a simple status string for display and queries.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Complete => "complete",
            JobStatus::Failed => "failed",
        }
    }

    /// Parse a status string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "running" => Some(JobStatus::Running),
            "complete" => Some(JobStatus::Complete),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of a recorded job failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Parameters did not match the stage contract.
    InvalidParams,
    /// The job type is not one of the pipeline stages.
    UnknownJobType,
    /// The stage handler returned an error, panicked or timed out.
    HandlerExecution,
    /// The job was reconciled after its worker stopped reporting.
    Orphaned,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::InvalidParams => "invalid_params",
            FailureKind::UnknownJobType => "unknown_job_type",
            FailureKind::HandlerExecution => "handler_execution",
            FailureKind::Orphaned => "orphaned",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure recorded on a job that reached the `failed` state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl JobFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Build the failure to record for a per-job error.
    pub fn from_error(error: &PipelineError) -> Self {
        Self::new(error.failure_kind(), error.to_string())
    }
}

impl std::fmt::Display for JobFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// A job is one unit of stage work tracked by the job store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier for this job.
    pub id: JobId,
    /// Stage tag as submitted (e.g. `L2_extract`); parsed at dispatch.
    pub job_type: String,
    /// Stage parameters as submitted.
    pub params: serde_json::Value,
    /// Higher priority is served first.
    pub priority: i64,
    /// Current status.
    pub status: JobStatus,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
    /// When a worker claimed the job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Worker holding (or last holding) the job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<String>,
    /// Set only when `status` is `failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobFailure>,
    /// Set only when `status` is `complete`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<StageResult>,
}

impl Job {
    /// Create a new pending job without validating its parameters.
    pub fn new(job_type: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            id: JobId::new(),
            job_type: job_type.into(),
            params,
            priority: 0,
            status: JobStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            worker_id: None,
            error: None,
            result: None,
        }
    }

    /// Create a pending job from typed stage parameters.
    pub fn from_stage(params: &StageParams) -> Self {
        Self::new(params.job_type().as_str(), params.to_value())
    }

    /// Prepare a job submitted by an external producer.
    ///
    /// Parameters of known stages are validated here, at the boundary. An
    /// unrecognized job type is accepted so that the dispatcher records it as
    /// an `unknown_job_type` failure.
    pub fn submit(
        job_type: &str,
        params: serde_json::Value,
        priority: i64,
    ) -> Result<Self, PipelineError> {
        match job_type.parse::<JobType>() {
            Ok(stage) => {
                StageParams::parse(stage, &params)?;
            }
            Err(_) => {
                tracing::warn!(
                    "Accepting job with unrecognized type '{}'; it will fail at dispatch",
                    job_type
                );
            }
        }
        Ok(Self::new(job_type, params).with_priority(priority))
    }

    /// Set the priority for this job.
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    /// Resolve the stage tag.
    pub fn stage(&self) -> Result<JobType, PipelineError> {
        self.job_type.parse()
    }

    /// Resolve and validate the typed stage parameters.
    pub fn stage_params(&self) -> Result<StageParams, PipelineError> {
        StageParams::parse(self.stage()?, &self.params)
    }

    /// Transition `pending -> running`.
    pub fn mark_running(
        &mut self,
        worker_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), PipelineError> {
        if self.status != JobStatus::Pending {
            return Err(PipelineError::DoubleTransition(self.id));
        }
        self.status = JobStatus::Running;
        self.started_at = Some(now);
        self.worker_id = Some(worker_id.into());
        Ok(())
    }

    /// Transition `running -> complete`.
    pub fn mark_complete(
        &mut self,
        result: StageResult,
        now: DateTime<Utc>,
    ) -> Result<(), PipelineError> {
        if self.status != JobStatus::Running {
            return Err(PipelineError::DoubleTransition(self.id));
        }
        self.status = JobStatus::Complete;
        self.completed_at = Some(now);
        self.result = Some(result);
        Ok(())
    }

    /// Transition `running -> failed`.
    pub fn mark_failed(
        &mut self,
        failure: JobFailure,
        now: DateTime<Utc>,
    ) -> Result<(), PipelineError> {
        if self.status != JobStatus::Running {
            return Err(PipelineError::DoubleTransition(self.id));
        }
        self.status = JobStatus::Failed;
        self.completed_at = Some(now);
        self.error = Some(failure);
        Ok(())
    }
}
