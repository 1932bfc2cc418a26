//! Backend selection for the object store.

use std::path::PathBuf;

use crate::StorageError;

/// Default root for the filesystem backend.
pub const DEFAULT_FS_ROOT: &str = "./data/pipeline";

#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub allow_http: bool,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    pub virtual_hosted_style: bool,
}

#[derive(Debug, Clone)]
pub enum StorageBackendConfig {
    S3(S3Config),
    Filesystem { root: PathBuf },
    Memory,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackendConfig,
    /// Optional key prefix applied to all object keys.
    pub prefix: Option<String>,
}

impl StorageConfig {
    pub fn memory() -> Self {
        Self {
            backend: StorageBackendConfig::Memory,
            prefix: None,
        }
    }

    pub fn filesystem(root: impl Into<PathBuf>) -> Self {
        Self {
            backend: StorageBackendConfig::Filesystem { root: root.into() },
            prefix: None,
        }
    }

    pub fn s3(cfg: S3Config) -> Self {
        Self {
            backend: StorageBackendConfig::S3(cfg),
            prefix: None,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = non_empty(prefix.into());
        self
    }

    /// Build a config from environment variables.
    ///
    /// - `STORAGE_BACKEND`: `s3`, `filesystem` (default) or `memory`
    /// - `STORAGE_FS_ROOT`: filesystem root, default `./data/pipeline`
    /// - `STORAGE_PREFIX`: key prefix for every object
    /// - `S3_BUCKET` (required for s3), `AWS_REGION`, `S3_ENDPOINT`,
    ///   `S3_ALLOW_HTTP`, `S3_VIRTUAL_HOSTED_STYLE` and the usual AWS keys
    pub fn from_env() -> Result<Self, StorageError> {
        let cfg = match env("STORAGE_BACKEND").as_deref() {
            Some("s3") => Self::s3(S3Config::from_env()?),
            Some("memory") | Some("mem") => Self::memory(),
            Some("filesystem") | Some("fs") | None => Self::filesystem(
                env("STORAGE_FS_ROOT").unwrap_or_else(|| DEFAULT_FS_ROOT.to_string()),
            ),
            Some(other) => {
                return Err(StorageError::InvalidConfig(format!(
                    "unsupported STORAGE_BACKEND={other} (expected s3|filesystem|memory)"
                )));
            }
        };

        Ok(Self {
            prefix: env("STORAGE_PREFIX"),
            ..cfg
        })
    }
}

impl S3Config {
    fn from_env() -> Result<Self, StorageError> {
        let bucket = env("S3_BUCKET").ok_or_else(|| {
            StorageError::InvalidConfig("S3_BUCKET is required for s3 backend".into())
        })?;
        let endpoint = env("S3_ENDPOINT");
        let allow_http = match flag("S3_ALLOW_HTTP")? {
            Some(v) => v,
            None => endpoint
                .as_deref()
                .is_some_and(|e| e.to_ascii_lowercase().starts_with("http://")),
        };

        Ok(Self {
            bucket,
            region: env("AWS_REGION").unwrap_or_else(|| "us-east-1".to_string()),
            endpoint,
            allow_http,
            access_key_id: env("AWS_ACCESS_KEY_ID"),
            secret_access_key: env("AWS_SECRET_ACCESS_KEY"),
            session_token: env("AWS_SESSION_TOKEN"),
            virtual_hosted_style: flag("S3_VIRTUAL_HOSTED_STYLE")?.unwrap_or(false),
        })
    }
}

pub(crate) fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn env(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(non_empty)
}

fn flag(name: &str) -> Result<Option<bool>, StorageError> {
    let Some(raw) = env(name) else {
        return Ok(None);
    };
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" => Ok(Some(true)),
        "0" | "false" | "no" | "n" => Ok(Some(false)),
        _ => Err(StorageError::InvalidConfig(format!(
            "invalid boolean for {name}={raw} (expected true/false)"
        ))),
    }
}
