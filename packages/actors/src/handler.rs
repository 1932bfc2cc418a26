//! Closure-backed stage handlers and guarded stage execution.

use std::any::Any;
use std::future::Future;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures_util::FutureExt;
use pipeline_core::{
    JobId, PipelineError, StageFuture, StageHandler, StageParams, StageResult, StageTable,
};

/// Result type for stage handlers.
pub type HandlerResult = Result<StageResult, PipelineError>;

/// A simple function-based stage handler.
///
/// Handy for tests and for wiring a stage that needs no state of its own.
pub struct FnStage<P, F> {
    handler: F,
    _params: PhantomData<fn() -> P>,
}

impl<P, F> FnStage<P, F> {
    /// Create a new function-based handler.
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _params: PhantomData,
        }
    }
}

impl<P, F, Fut> StageHandler for FnStage<P, F>
where
    P: Clone + Send + Sync + 'static,
    F: Fn(JobId, P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    type Params = P;

    fn handle<'a>(&'a self, job_id: JobId, params: &'a P) -> StageFuture<'a> {
        Box::pin((self.handler)(job_id, params.clone()))
    }
}

/// Run the handler for `params`, turning panics and timeouts into
/// `HandlerExecution` errors.
pub async fn run_stage(
    stages: &StageTable,
    job_id: JobId,
    params: &StageParams,
    timeout: Option<Duration>,
) -> HandlerResult {
    // Handlers may panic while building their future, not only while polling it.
    let guarded =
        AssertUnwindSafe(async move { stages.dispatch(job_id, params).await }).catch_unwind();

    let outcome = match timeout {
        Some(limit) => match tokio::time::timeout(limit, guarded).await {
            Ok(outcome) => outcome,
            Err(_) => {
                return Err(PipelineError::execution(format!(
                    "stage timed out after {}s",
                    limit.as_secs_f64()
                )));
            }
        },
        None => guarded.await,
    };

    outcome.unwrap_or_else(|payload| {
        Err(PipelineError::execution(format!(
            "stage panicked: {}",
            panic_message(payload.as_ref())
        )))
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
