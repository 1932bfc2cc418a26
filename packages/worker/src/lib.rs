//! Worker binary support: CLI definition, wiring and subcommands.

mod cli;
mod commands;

use anyhow::Context;
use db::DbConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use cli::{Cli, Command, CredentialCommand, ResultTarget, RunArgs};

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,surrealdb=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Connect to the job store and run the selected subcommand.
pub async fn execute(cli: Cli) -> anyhow::Result<()> {
    if let Command::Credential(CredentialCommand::GenerateKey) = cli.command {
        println!("{}", db::CredentialVault::generate_key());
        return Ok(());
    }

    let config = DbConfig::from_location(&cli.db)
        .with_namespace(&cli.namespace)
        .with_database(&cli.database);
    if config.is_ephemeral() {
        tracing::warn!(
            "Job store {} is in memory; jobs are lost on exit and not shared with other \
             processes. Pass --db <path> or set PIPELINE_DB to persist them",
            cli.db
        );
    }
    db::init(config)
        .await
        .with_context(|| format!("failed to open job store at {}", cli.db))?;

    match cli.command {
        Command::Run(args) => commands::run(&cli.db, args).await,
        Command::Enqueue {
            job_type,
            params,
            priority,
        } => commands::enqueue(&job_type, &params, priority).await,
        Command::Show { job_id } => commands::show(&job_id).await,
        Command::List {
            status,
            job_type,
            limit,
        } => commands::list(status.as_deref(), job_type, limit).await,
        Command::Reconcile { stale_after } => commands::reconcile(stale_after).await,
        Command::Credential(CredentialCommand::Set {
            user_id,
            provider,
            secret,
        }) => commands::set_credential(&user_id, &provider, &secret).await,
        Command::Credential(CredentialCommand::GenerateKey) => Ok(()),
    }
}
