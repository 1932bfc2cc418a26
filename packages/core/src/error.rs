//! Error taxonomy for the pipeline.

use thiserror::Error;

use crate::job::{FailureKind, JobId};
use crate::stage::JobType;

/// Errors raised by the job store, the stages and the dispatcher.
///
/// Per-job errors (`InvalidParams`, `UnknownJobType`, `HandlerExecution`)
/// end up recorded on the job. `StoreUnavailable` is transient and never
/// touches job state.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error("invalid params for {job_type}: {reason}")]
    InvalidParams { job_type: JobType, reason: String },

    #[error("unknown job type: {0}")]
    UnknownJobType(String),

    #[error("stage execution failed: {0}")]
    HandlerExecution(String),

    #[error("job store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("job {0} is not running")]
    DoubleTransition(JobId),

    #[error("job not found: {0}")]
    JobNotFound(JobId),

    #[error("credential error: {0}")]
    Credential(String),
}

impl PipelineError {
    pub fn invalid_params(job_type: JobType, reason: impl Into<String>) -> Self {
        Self::InvalidParams {
            job_type,
            reason: reason.into(),
        }
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self::HandlerExecution(message.into())
    }

    /// Whether the error is an infrastructure fault worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, PipelineError::StoreUnavailable(_))
    }

    /// Failure category recorded on a job that failed with this error.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            PipelineError::InvalidParams { .. } => FailureKind::InvalidParams,
            PipelineError::UnknownJobType(_) => FailureKind::UnknownJobType,
            _ => FailureKind::HandlerExecution,
        }
    }
}
