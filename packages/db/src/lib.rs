//! SurrealDB integration for the pipeline job system.
//!
//! This crate provides database connectivity, repositories and the durable
//! implementations of the job store, result sink and credential store.
//!
//! # Features
//!
//! - `memory` (default): Use in-memory storage for testing
//! - `rocksdb`: Use RocksDB for persistent file-based storage

mod connection;
pub mod repositories;
mod schema;
mod store;
mod vault;

pub use connection::{Database, DbConfig, DbError, get_db, init_db};
pub use schema::init_schema;
pub use store::{SurrealCredentialStore, SurrealJobStore, SurrealResultSink};
pub use vault::{CredentialVault, MASTER_KEY_ENV};

/// Initialize the database with the given configuration.
///
/// This should be called once at application startup.
pub async fn init(config: DbConfig) -> Result<(), DbError> {
    init_db(config).await?;
    init_schema().await?;
    Ok(())
}
