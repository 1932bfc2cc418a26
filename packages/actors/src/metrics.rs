//! Per-worker counters.

use pipeline_core::JobId;
use serde::Serialize;

use crate::dispatch::Tick;

/// Counters owned by a single worker and reported on request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerMetrics {
    pub worker_id: String,
    pub completed: u64,
    pub failed: u64,
    pub idle_polls: u64,
    pub store_errors: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_job: Option<JobId>,
}

impl WorkerMetrics {
    pub fn new(worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            ..Default::default()
        }
    }

    /// Jobs this worker claimed and finished, either way.
    pub fn processed(&self) -> u64 {
        self.completed + self.failed
    }

    pub fn record(&mut self, tick: &Tick) {
        match tick {
            Tick::Idle => self.idle_polls += 1,
            Tick::Completed(id) => {
                self.completed += 1;
                self.last_job = Some(*id);
            }
            Tick::Failed(id, _) => {
                self.failed += 1;
                self.last_job = Some(*id);
            }
            Tick::StoreError(_) => self.store_errors += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use pipeline_core::{FailureKind, PipelineError};

    use super::*;

    #[test]
    fn ticks_update_matching_counters() {
        let mut metrics = WorkerMetrics::new("worker-1");
        let id = JobId::new();
        metrics.record(&Tick::Idle);
        metrics.record(&Tick::Completed(id));
        metrics.record(&Tick::Failed(JobId::new(), FailureKind::InvalidParams));
        metrics.record(&Tick::StoreError(PipelineError::StoreUnavailable("down".into())));

        assert_eq!(metrics.idle_polls, 1);
        assert_eq!(metrics.processed(), 2);
        assert_eq!(metrics.store_errors, 1);
        assert_ne!(metrics.last_job, Some(id));
    }
}
