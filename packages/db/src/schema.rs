//! Database schema definitions using SurrealQL.

use crate::{DbError, get_db};

/// Initialize the database schema.
///
/// Creates the tables and indexes. Safe to run on every start.
pub async fn init_schema() -> Result<(), DbError> {
    let db = get_db()?;

    tracing::info!("Initializing database schema...");

    db.query(JOB_SCHEMA).await?.check()?;
    db.query(STAGE_RESULT_SCHEMA).await?.check()?;
    db.query(CREDENTIAL_SCHEMA).await?.check()?;

    tracing::info!("Database schema initialized");

    Ok(())
}

/// Job table schema.
///
/// Rows are written from serde, so timestamps are RFC 3339 strings and
/// `params`, `error` and `result` are nested objects.
const JOB_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS job SCHEMALESS;

DEFINE FIELD IF NOT EXISTS job_id ON job TYPE string;
DEFINE FIELD IF NOT EXISTS job_type ON job TYPE string;
DEFINE FIELD IF NOT EXISTS priority ON job TYPE int DEFAULT 0;
DEFINE FIELD IF NOT EXISTS status ON job TYPE string DEFAULT "pending";
DEFINE FIELD IF NOT EXISTS created_us ON job TYPE int DEFAULT 0;

DEFINE INDEX IF NOT EXISTS job_id ON job FIELDS job_id UNIQUE;
DEFINE INDEX IF NOT EXISTS job_status ON job FIELDS status;
DEFINE INDEX IF NOT EXISTS job_type ON job FIELDS job_type;

-- Claim order: pending jobs by priority, then creation time, then id
DEFINE INDEX IF NOT EXISTS job_claim ON job FIELDS status, priority, created_us, job_id;
"#;

/// Stage results keyed by job.
const STAGE_RESULT_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS stage_result SCHEMALESS;

DEFINE FIELD IF NOT EXISTS job_id ON stage_result TYPE string;
DEFINE FIELD IF NOT EXISTS job_type ON stage_result TYPE string;
DEFINE FIELD IF NOT EXISTS result ON stage_result TYPE object;

DEFINE INDEX IF NOT EXISTS result_job ON stage_result FIELDS job_id UNIQUE;
DEFINE INDEX IF NOT EXISTS result_type ON stage_result FIELDS job_type;
"#;

/// Encrypted provider credentials.
const CREDENTIAL_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS credential SCHEMALESS;

DEFINE FIELD IF NOT EXISTS user_id ON credential TYPE string;
DEFINE FIELD IF NOT EXISTS provider ON credential TYPE string;
DEFINE FIELD IF NOT EXISTS ciphertext ON credential TYPE string;

DEFINE INDEX IF NOT EXISTS credential_owner ON credential FIELDS user_id, provider UNIQUE;
"#;
