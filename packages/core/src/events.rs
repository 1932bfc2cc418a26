//! Event types for real-time updates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{FailureKind, JobId};

/// Events emitted by the dispatcher and the worker supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    // Job events
    /// A new job was enqueued.
    JobEnqueued {
        job_id: JobId,
        job_type: String,
        priority: i64,
        timestamp: DateTime<Utc>,
    },
    /// A worker claimed a job.
    JobStarted {
        job_id: JobId,
        job_type: String,
        worker_id: String,
        timestamp: DateTime<Utc>,
    },
    /// A job completed successfully.
    JobCompleted {
        job_id: JobId,
        worker_id: String,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    /// A job failed.
    JobFailed {
        job_id: JobId,
        worker_id: String,
        kind: FailureKind,
        error: String,
        timestamp: DateTime<Utc>,
    },

    // Worker events
    /// A worker started polling.
    WorkerConnected {
        worker_id: String,
        timestamp: DateTime<Utc>,
    },
    /// A worker stopped.
    WorkerDisconnected {
        worker_id: String,
        reason: Option<String>,
        timestamp: DateTime<Utc>,
    },
    /// A worker could not reach the job store.
    StoreUnavailable {
        worker_id: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl JobEvent {
    /// Get a short description of this event for logging.
    pub fn description(&self) -> String {
        match self {
            JobEvent::JobEnqueued {
                job_id,
                job_type,
                priority,
                ..
            } => format!("Job {} ({}) enqueued at priority {}", job_id, job_type, priority),
            JobEvent::JobStarted {
                job_id, worker_id, ..
            } => format!("Job {} started by {}", job_id, worker_id),
            JobEvent::JobCompleted {
                job_id,
                duration_ms,
                ..
            } => format!("Job {} completed in {}ms", job_id, duration_ms),
            JobEvent::JobFailed {
                job_id,
                kind,
                error,
                ..
            } => format!("Job {} failed ({}): {}", job_id, kind, error),
            JobEvent::WorkerConnected { worker_id, .. } => {
                format!("Worker {} connected", worker_id)
            }
            JobEvent::WorkerDisconnected {
                worker_id, reason, ..
            } => {
                let reason = reason.as_deref().unwrap_or("shutdown");
                format!("Worker {} disconnected: {}", worker_id, reason)
            }
            JobEvent::StoreUnavailable {
                worker_id, error, ..
            } => format!("Worker {} cannot reach job store: {}", worker_id, error),
        }
    }
}
