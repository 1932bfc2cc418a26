//! Actor system for the stage pipeline.
//!
//! This crate provides the Ractor-based worker pool that drains a
//! [`JobStore`](pipeline_core::JobStore) through the stage table.
//!
//! # Architecture
//!
//! - `Supervisor` - Top-level actor that spawns, links and respawns workers
//! - `WorkerActor` - Polls the store and runs one job at a time
//! - `Dispatcher` - A single claim, validate, execute and record iteration
//!
//! Workers share the store and never talk to each other; the store's atomic
//! claim is the only coordination between them.
//!
//! # Usage
//!
//! ```ignore
//! use actors::{PoolConfig, SupervisorMessage, start_pipeline};
//!
//! let config = PoolConfig::default().with_workers(4);
//! let (supervisor, handle) = start_pipeline(store, stage_table(deps), config).await?;
//! supervisor.send_message(SupervisorMessage::Shutdown)?;
//! handle.await?;
//! ```

mod dispatch;
mod handler;
mod messages;
mod metrics;
mod supervisor;
mod worker_actor;

pub use dispatch::{Dispatcher, Tick};
pub use handler::{FnStage, HandlerResult, run_stage};
pub use messages::{SupervisorMessage, WorkerMessage};
pub use metrics::WorkerMetrics;
pub use supervisor::{PoolConfig, Supervisor, SupervisorArgs, start_pipeline};
pub use worker_actor::{WorkerActor, WorkerArgs};

/// Re-export ractor types for convenience.
pub use ractor::{Actor, ActorRef, RpcReplyPort, concurrency};
