//! Subcommand implementations.

use std::sync::Arc;
use std::time::Duration;

use actors::{ActorRef, PoolConfig, SupervisorMessage, start_pipeline};
use anyhow::{Context, anyhow, bail};
use db::{CredentialVault, SurrealCredentialStore, SurrealJobStore, SurrealResultSink};
use pipeline_core::{
    ArticleLibrary, JobEvent, JobFilter, JobId, JobStatus, JobStore, LogResultSink, PipelineError,
    ResultSink, TriageConfig,
};
use ractor::rpc::{CallResult, call};
use stages::{StageDeps, stage_table};
use storage::{ObjectLibrary, ObjectResultSink, Storage};
use tokio::sync::broadcast;

use crate::cli::{ResultTarget, RunArgs};

pub async fn run(location: &str, args: RunArgs) -> anyhow::Result<()> {
    let storage = Storage::from_env()
        .await
        .context("failed to configure object storage")?;
    tracing::info!("Article library on {} storage", storage.kind().as_str());

    let sink: Arc<dyn ResultSink> = match args.results {
        ResultTarget::Database => Arc::new(SurrealResultSink),
        ResultTarget::Objects => Arc::new(ObjectResultSink::new(storage.clone())),
        ResultTarget::Log => Arc::new(LogResultSink),
    };
    let store = Arc::new(SurrealJobStore::new().with_sink(sink));
    let library: Arc<dyn ArticleLibrary> = Arc::new(ObjectLibrary::new(storage));

    let mut triage = TriageConfig::default();
    if let Some(threshold) = args.triage_threshold {
        triage = triage.with_threshold(threshold);
    }
    let mut deps = StageDeps::new(library).with_triage(triage);
    match CredentialVault::from_env() {
        Ok(vault) => deps = deps.with_credentials(Arc::new(SurrealCredentialStore::new(vault))),
        Err(e) => tracing::warn!("Provider credentials disabled: {}", e),
    }

    let stage_timeout = (args.stage_timeout > 0).then(|| Duration::from_secs(args.stage_timeout));
    let config = PoolConfig::default()
        .with_workers(args.workers)
        .with_poll_interval(Duration::from_secs(args.poll_interval))
        .with_stage_timeout(stage_timeout);
    tracing::info!(
        "Worker starting (poll_interval={}s, workers={}, db={})",
        args.poll_interval,
        config.workers,
        location
    );

    let (supervisor, handle) = start_pipeline(store, stage_table(deps), config).await?;
    log_events(&supervisor)?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    let (processed, errors) = totals(&supervisor).await;
    tracing::info!("Worker stopping... (processed={}, errors={})", processed, errors);
    supervisor
        .send_message(SupervisorMessage::Shutdown)
        .map_err(|e| anyhow!("failed to stop workers: {}", e))?;
    handle.await?;
    tracing::info!("Worker stopped");
    Ok(())
}

/// Mirror pipeline events into the log at debug level.
fn log_events(supervisor: &ActorRef<SupervisorMessage>) -> anyhow::Result<()> {
    let (tx, mut rx) = broadcast::channel::<JobEvent>(256);
    supervisor
        .send_message(SupervisorMessage::Subscribe { sender: tx })
        .map_err(|e| anyhow!("failed to subscribe to events: {}", e))?;
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => tracing::debug!(event = %event.description(), "Pipeline event"),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!("Event log skipped {} events", skipped)
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
    Ok(())
}

/// Processed jobs and failures summed over the live workers.
async fn totals(supervisor: &ActorRef<SupervisorMessage>) -> (u64, u64) {
    let reply = call(
        supervisor,
        |reply| SupervisorMessage::GetMetrics { reply },
        Some(Duration::from_secs(10)),
    )
    .await;
    match reply {
        Ok(CallResult::Success(metrics)) => metrics.iter().fold((0, 0), |(done, errs), m| {
            (done + m.processed(), errs + m.failed + m.store_errors)
        }),
        _ => (0, 0),
    }
}

pub async fn enqueue(job_type: &str, params: &str, priority: i64) -> anyhow::Result<()> {
    let params: serde_json::Value =
        serde_json::from_str(params).context("--params must be a JSON object")?;
    let id = SurrealJobStore::new()
        .enqueue(job_type, params, priority)
        .await?;
    println!("{}", id);
    Ok(())
}

pub async fn show(job_id: &str) -> anyhow::Result<()> {
    let id = JobId::parse(job_id).with_context(|| format!("invalid job id: {}", job_id))?;
    let job = SurrealJobStore::new()
        .get(id)
        .await?
        .ok_or(PipelineError::JobNotFound(id))?;
    println!("{}", serde_json::to_string_pretty(&job)?);
    Ok(())
}

pub async fn list(
    status: Option<&str>,
    job_type: Option<String>,
    limit: usize,
) -> anyhow::Result<()> {
    let mut filter = JobFilter::default().with_limit(limit);
    if let Some(status) = status {
        let Some(status) = JobStatus::parse(status) else {
            bail!("unknown status '{}' (expected pending|running|complete|failed)", status);
        };
        filter = filter.with_status(status);
    }
    if let Some(job_type) = job_type {
        filter = filter.with_job_type(job_type);
    }

    for job in SurrealJobStore::new().list(filter).await? {
        let detail = match (&job.error, &job.result) {
            (Some(failure), _) => failure.to_string(),
            (None, Some(result)) => result.summary(),
            (None, None) => String::new(),
        };
        println!(
            "{}  {:<9} {:<14} {:>4}  {}",
            job.id,
            job.status.as_str(),
            job.job_type,
            job.priority,
            detail
        );
    }
    Ok(())
}

pub async fn reconcile(stale_after: i64) -> anyhow::Result<()> {
    let failed = SurrealJobStore::new()
        .fail_orphans(chrono::Duration::seconds(stale_after))
        .await?;
    for id in &failed {
        println!("{}", id);
    }
    tracing::info!("Reconciled {} orphaned jobs", failed.len());
    Ok(())
}

pub async fn set_credential(user_id: &str, provider: &str, secret: &str) -> anyhow::Result<()> {
    let vault = CredentialVault::from_env().context("MASTER_KEY must hold a base64 32-byte key")?;
    SurrealCredentialStore::new(vault)
        .store_credential(user_id, provider, secret)
        .await?;
    Ok(())
}
