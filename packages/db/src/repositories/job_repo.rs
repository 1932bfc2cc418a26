//! Job repository: row mapping and guarded state transitions.

use chrono::{DateTime, Utc};
use pipeline_core::{Job, JobFailure, JobFilter, JobId, JobStatus, StageResult};
use serde::{Deserialize, Serialize};
use surrealdb::RecordId;

use crate::{DbError, get_db};

/// Claims retried after losing a race to another process.
const CLAIM_ATTEMPTS: usize = 8;

/// Repository for job persistence operations.
pub struct JobRepository;

/// Internal record type for SurrealDB.
///
/// The record id mirrors `job_id`; the domain id lives in its own field so
/// that it never collides with SurrealDB's `id`.
#[derive(Debug, Serialize, Deserialize)]
struct JobRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<RecordId>,
    job_id: String,
    job_type: String,
    #[serde(default)]
    params: serde_json::Value,
    priority: i64,
    status: JobStatus,
    created_at: DateTime<Utc>,
    /// `created_at` in microseconds; ids only order creation within one process.
    #[serde(default)]
    created_us: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    worker_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<JobFailure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<StageResult>,
}

impl From<&Job> for JobRecord {
    fn from(job: &Job) -> Self {
        Self {
            id: None,
            job_id: job.id.to_string(),
            job_type: job.job_type.clone(),
            params: job.params.clone(),
            priority: job.priority,
            status: job.status,
            created_at: job.created_at,
            created_us: job.created_at.timestamp_micros(),
            started_at: job.started_at,
            completed_at: job.completed_at,
            worker_id: job.worker_id.clone(),
            error: job.error.clone(),
            result: job.result.clone(),
        }
    }
}

impl TryFrom<JobRecord> for Job {
    type Error = DbError;

    fn try_from(record: JobRecord) -> Result<Self, Self::Error> {
        let id = JobId::parse(&record.job_id)
            .map_err(|e| DbError::Serialization(format!("bad job id {}: {}", record.job_id, e)))?;
        Ok(Job {
            id,
            job_type: record.job_type,
            params: record.params,
            priority: record.priority,
            status: record.status,
            created_at: record.created_at,
            started_at: record.started_at,
            completed_at: record.completed_at,
            worker_id: record.worker_id,
            error: record.error,
            result: record.result,
        })
    }
}

fn first_job(records: Vec<JobRecord>) -> Result<Option<Job>, DbError> {
    records.into_iter().next().map(Job::try_from).transpose()
}

#[derive(Debug, Deserialize)]
struct ClaimCandidate {
    job_id: String,
}

impl JobRepository {
    /// Create a new job in the database.
    pub async fn create(job: &Job) -> Result<Job, DbError> {
        let db = get_db()?;

        let record: Option<JobRecord> = db
            .create(("job", job.id.to_string()))
            .content(JobRecord::from(job))
            .await?;

        record
            .map(Job::try_from)
            .transpose()?
            .ok_or_else(|| DbError::Query("Failed to create job".into()))
    }

    /// Get a job by ID.
    pub async fn get(id: JobId) -> Result<Option<Job>, DbError> {
        let db = get_db()?;

        let record: Option<JobRecord> = db.select(("job", id.to_string())).await?;

        record.map(Job::try_from).transpose()
    }

    /// List jobs with optional filtering, oldest first.
    pub async fn list(filter: &JobFilter) -> Result<Vec<Job>, DbError> {
        let db = get_db()?;

        let mut conditions = Vec::new();
        let mut bindings: Vec<(&'static str, String)> = Vec::new();

        if let Some(status) = filter.status {
            conditions.push("status = $status");
            bindings.push(("status", status.as_str().to_string()));
        }

        if let Some(job_type) = &filter.job_type {
            conditions.push("job_type = $job_type");
            bindings.push(("job_type", job_type.clone()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let limit_clause = filter
            .limit
            .map(|l| format!("LIMIT {}", l))
            .unwrap_or_default();

        let query = format!(
            "SELECT * FROM job {} ORDER BY created_us ASC, job_id ASC {}",
            where_clause, limit_clause
        );

        let mut result = db.query(&query);

        for (name, value) in bindings {
            result = result.bind((name, value));
        }

        let mut response = result.await?;
        let records: Vec<JobRecord> = response.take(0)?;

        records.into_iter().map(Job::try_from).collect()
    }

    /// Claim the next pending job for `worker_id`.
    ///
    /// The update is guarded on `status = 'pending'`; a claimer that loses
    /// the race gets no row back and moves on to the next candidate.
    pub async fn claim_next(worker_id: &str) -> Result<Option<Job>, DbError> {
        let db = get_db()?;

        for _ in 0..CLAIM_ATTEMPTS {
            let mut response = db
                .query(
                    r#"
                    SELECT job_id, priority, created_us FROM job
                    WHERE status = "pending"
                    ORDER BY priority DESC, created_us ASC, job_id ASC
                    LIMIT 1
                    "#,
                )
                .await?;
            let candidates: Vec<ClaimCandidate> = response.take(0)?;
            let Some(candidate) = candidates.into_iter().next() else {
                return Ok(None);
            };

            let mut response = db
                .query(
                    r#"
                    UPDATE type::thing("job", $job_id)
                    SET status = "running", started_at = $now, worker_id = $worker_id
                    WHERE status = "pending"
                    RETURN AFTER
                    "#,
                )
                .bind(("job_id", candidate.job_id.clone()))
                .bind(("now", Utc::now()))
                .bind(("worker_id", worker_id.to_string()))
                .await?;
            let claimed: Vec<JobRecord> = response.take(0)?;
            if let Some(job) = first_job(claimed)? {
                return Ok(Some(job));
            }

            tracing::debug!("Lost claim on job {}, retrying", candidate.job_id);
        }

        Ok(None)
    }

    /// Record a result on a running job. `None` if the job is not running.
    pub async fn mark_complete(id: JobId, result: &StageResult) -> Result<Option<Job>, DbError> {
        let db = get_db()?;

        let mut response = db
            .query(
                r#"
                UPDATE type::thing("job", $job_id)
                SET status = "complete", completed_at = $now, result = $result
                WHERE status = "running"
                RETURN AFTER
                "#,
            )
            .bind(("job_id", id.to_string()))
            .bind(("now", Utc::now()))
            .bind(("result", result.clone()))
            .await?;

        first_job(response.take(0)?)
    }

    /// Record a failure on a running job. `None` if the job is not running.
    pub async fn mark_failed(id: JobId, failure: &JobFailure) -> Result<Option<Job>, DbError> {
        let db = get_db()?;

        let mut response = db
            .query(
                r#"
                UPDATE type::thing("job", $job_id)
                SET status = "failed", completed_at = $now, error = $error
                WHERE status = "running"
                RETURN AFTER
                "#,
            )
            .bind(("job_id", id.to_string()))
            .bind(("now", Utc::now()))
            .bind(("error", failure.clone()))
            .await?;

        first_job(response.take(0)?)
    }

    /// Count jobs by status.
    pub async fn count_by_status() -> Result<std::collections::HashMap<String, u64>, DbError> {
        let db = get_db()?;

        let mut result = db
            .query("SELECT status, count() AS count FROM job GROUP BY status")
            .await?;

        #[derive(Deserialize)]
        struct StatusCount {
            status: Option<String>,
            count: i64,
        }

        let counts: Vec<StatusCount> = result.take(0)?;

        let mut map = std::collections::HashMap::new();
        for count in counts {
            if let Some(status) = count.status {
                map.insert(status, count.count.max(0) as u64);
            }
        }

        Ok(map)
    }
}
