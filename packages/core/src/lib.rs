//! Core domain types for the literature pipeline job system.
//!
//! This crate contains shared types used across all packages:
//! - Job, JobStatus and the job store contract
//! - Stage types (L0-L4), their typed parameters and results
//! - Collaborator interfaces (result sink, article library, credentials, triage)
//! - Events for real-time updates

mod credentials;
mod error;
mod events;
mod job;
mod library;
mod sink;
mod stage;
mod store;
mod triage;

pub use credentials::{CredentialStore, Secret, StaticCredentials, mask_secret};
pub use error::PipelineError;
pub use events::JobEvent;
pub use job::{FailureKind, Job, JobFailure, JobId, JobStatus};
pub use library::{
    ArticleLibrary, ArticleRecord, EffectDirection, Finding, InMemoryLibrary, LibraryError,
    query_terms,
};
pub use sink::{LogResultSink, ResultSink};
pub use stage::{
    ArticleId, BoxFuture, ClusterId, ClusterParams, ExpandParams, ExtractParams, HarvestParams,
    JobType, StageFuture, StageHandler, StageParams, StageResult, StageTable, SynthesizeParams,
};
pub use store::{JobFilter, JobStore, MemoryJobStore};
pub use triage::{TriageConfig, TriageDecision, TriageScorer};
