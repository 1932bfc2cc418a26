//! Stage results written as JSON objects.

use chrono::{DateTime, Utc};
use pipeline_core::{BoxFuture, JobId, JobType, PipelineError, ResultSink, StageResult};
use serde::{Deserialize, Serialize};

use crate::{Storage, StorageError};

/// Object key of a stage result.
pub fn result_key(job_type: JobType, job_id: JobId) -> String {
    format!("results/{}/{}.json", job_type, job_id)
}

/// Body of a result object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultDocument {
    pub job_id: JobId,
    pub job_type: JobType,
    pub result: StageResult,
    pub recorded_at: DateTime<Utc>,
}

/// Result sink that writes `results/{job_type}/{job_id}.json`.
#[derive(Clone)]
pub struct ObjectResultSink {
    storage: Storage,
}

impl ObjectResultSink {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    pub async fn load(
        &self,
        job_type: JobType,
        job_id: JobId,
    ) -> Result<Option<ResultDocument>, StorageError> {
        self.storage.get_json(&result_key(job_type, job_id)).await
    }
}

impl ResultSink for ObjectResultSink {
    fn persist<'a>(
        &'a self,
        job_id: JobId,
        job_type: JobType,
        result: &'a StageResult,
    ) -> BoxFuture<'a, Result<(), PipelineError>> {
        Box::pin(async move {
            let document = ResultDocument {
                job_id,
                job_type,
                result: result.clone(),
                recorded_at: Utc::now(),
            };
            let key = result_key(job_type, job_id);
            self.storage.put_json(&key, &document).await?;
            tracing::debug!("Wrote result object {}", key);
            Ok(())
        })
    }
}
