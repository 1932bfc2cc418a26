//! Repository implementations for database operations.

mod credential_repo;
mod job_repo;
mod result_repo;

pub use credential_repo::CredentialRepository;
pub use job_repo::JobRepository;
pub use result_repo::{ResultRepository, StoredResult};
