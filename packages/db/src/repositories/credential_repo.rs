//! Encrypted credential rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{DbError, get_db};

#[derive(Debug, Serialize, Deserialize)]
struct CredentialRecord {
    user_id: String,
    provider: String,
    ciphertext: String,
    updated_at: DateTime<Utc>,
}

fn record_key(user_id: &str, provider: &str) -> String {
    format!("{}/{}", user_id, provider)
}

/// Repository for provider credentials. Values are stored already encrypted.
pub struct CredentialRepository;

impl CredentialRepository {
    pub async fn put(user_id: &str, provider: &str, ciphertext: String) -> Result<(), DbError> {
        let db = get_db()?;

        let row = CredentialRecord {
            user_id: user_id.to_string(),
            provider: provider.to_string(),
            ciphertext,
            updated_at: Utc::now(),
        };

        let _: Option<CredentialRecord> = db
            .upsert(("credential", record_key(user_id, provider)))
            .content(row)
            .await?;

        Ok(())
    }

    pub async fn get(user_id: &str, provider: &str) -> Result<Option<String>, DbError> {
        let db = get_db()?;

        let record: Option<CredentialRecord> =
            db.select(("credential", record_key(user_id, provider))).await?;

        Ok(record.map(|r| r.ciphertext))
    }
}
