//! Stage result table, keyed by job.

use chrono::{DateTime, Utc};
use pipeline_core::{JobId, JobType, StageResult};
use serde::{Deserialize, Serialize};

use crate::{DbError, get_db};

/// A persisted stage result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredResult {
    pub job_id: String,
    pub job_type: JobType,
    pub result: StageResult,
    pub recorded_at: DateTime<Utc>,
}

/// Repository for stage results.
pub struct ResultRepository;

impl ResultRepository {
    /// Insert or replace the result for a job.
    pub async fn record(
        job_id: JobId,
        job_type: JobType,
        result: &StageResult,
    ) -> Result<StoredResult, DbError> {
        let db = get_db()?;

        let row = StoredResult {
            job_id: job_id.to_string(),
            job_type,
            result: result.clone(),
            recorded_at: Utc::now(),
        };

        let stored: Option<StoredResult> = db
            .upsert(("stage_result", job_id.to_string()))
            .content(row)
            .await?;

        stored.ok_or_else(|| DbError::Query(format!("Failed to record result for {}", job_id)))
    }

    pub async fn get(job_id: JobId) -> Result<Option<StoredResult>, DbError> {
        let db = get_db()?;
        let stored: Option<StoredResult> = db.select(("stage_result", job_id.to_string())).await?;
        Ok(stored)
    }
}
