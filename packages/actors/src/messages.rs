//! Message types for actor communication.

use pipeline_core::{JobEvent, JobId, PipelineError};
use ractor::RpcReplyPort;

use crate::metrics::WorkerMetrics;

/// Messages for the WorkerActor.
#[derive(Debug)]
pub enum WorkerMessage {
    /// Run one dispatcher iteration.
    Poll,

    /// Report this worker's local counters.
    GetMetrics { reply: RpcReplyPort<WorkerMetrics> },

    /// Stop after the current job, if any.
    Shutdown,
}

/// Messages for the Supervisor.
#[derive(Debug)]
pub enum SupervisorMessage {
    /// Validate and store a new pending job.
    Enqueue {
        job_type: String,
        params: serde_json::Value,
        priority: i64,
        reply: RpcReplyPort<Result<JobId, PipelineError>>,
    },

    /// Collect counters from every live worker.
    GetMetrics {
        reply: RpcReplyPort<Vec<WorkerMetrics>>,
    },

    /// Ids of the live workers.
    ListWorkers { reply: RpcReplyPort<Vec<String>> },

    /// Subscribe to events.
    Subscribe {
        sender: tokio::sync::broadcast::Sender<JobEvent>,
    },

    /// Stop all workers, then the supervisor.
    Shutdown,
}
