//! Result sinks receive stage outputs once a job completes.

use crate::{BoxFuture, JobId, JobType, PipelineError, StageResult};

/// Destination for completed stage results.
pub trait ResultSink: Send + Sync + 'static {
    fn persist<'a>(
        &'a self,
        job_id: JobId,
        job_type: JobType,
        result: &'a StageResult,
    ) -> BoxFuture<'a, Result<(), PipelineError>>;
}

/// Sink that only logs the result.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogResultSink;

impl ResultSink for LogResultSink {
    fn persist<'a>(
        &'a self,
        job_id: JobId,
        job_type: JobType,
        result: &'a StageResult,
    ) -> BoxFuture<'a, Result<(), PipelineError>> {
        Box::pin(async move {
            let body = serde_json::to_string(result)
                .map_err(|e| PipelineError::execution(format!("encode result: {}", e)))?;
            tracing::info!(job_id = %job_id, job_type = %job_type, result = %body, "Stage result");
            Ok(())
        })
    }
}
