//! Command-line interface.

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(name = "pipeline-worker")]
#[command(about = "Queue worker for the staged literature pipeline")]
pub struct Cli {
    /// Job store location: `mem://`, `rocksdb://<path>`, or a RocksDB path.
    /// The in-memory default does not outlive the process.
    #[arg(long, env = "PIPELINE_DB", default_value = "mem://", global = true)]
    pub db: String,

    #[arg(long, env = "PIPELINE_NAMESPACE", default_value = "pipeline", global = true)]
    pub namespace: String,

    #[arg(long, env = "PIPELINE_DATABASE", default_value = "main", global = true)]
    pub database: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Poll the store and execute jobs until interrupted
    Run(RunArgs),

    /// Submit a job
    Enqueue {
        /// Stage tag, e.g. `L0_harvest`
        job_type: String,
        /// Stage parameters as a JSON object
        #[arg(long, default_value = "{}")]
        params: String,
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        priority: i64,
    },

    /// Print one job as JSON
    Show { job_id: String },

    /// List jobs, oldest first
    List {
        /// pending, running, complete or failed
        #[arg(long)]
        status: Option<String>,
        #[arg(long = "type")]
        job_type: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },

    /// Fail jobs left running by a worker that went away
    Reconcile {
        /// Minimum time a job must have been running, in seconds
        #[arg(long, default_value_t = 3600)]
        stale_after: i64,
    },

    /// Manage encrypted provider credentials
    #[command(subcommand)]
    Credential(CredentialCommand),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Seconds between polls when idle or when the store is unreachable
    #[arg(long, env = "POLL_INTERVAL", default_value_t = 5)]
    pub poll_interval: u64,

    /// Number of concurrent workers
    #[arg(long, env = "WORKERS", default_value_t = 1)]
    pub workers: usize,

    /// Per-stage time limit in seconds; 0 disables it
    #[arg(long, env = "STAGE_TIMEOUT", default_value_t = 300)]
    pub stage_timeout: u64,

    /// Where completed stage results are written besides the job record
    #[arg(long, value_enum, default_value_t = ResultTarget::Database)]
    pub results: ResultTarget,

    /// Override the L1 triage keep threshold
    #[arg(long, env = "TRIAGE_THRESHOLD")]
    pub triage_threshold: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ResultTarget {
    /// `stage_result` table next to the jobs
    Database,
    /// Object storage under `results/`
    Objects,
    /// Log only
    Log,
}

#[derive(Debug, Subcommand)]
pub enum CredentialCommand {
    /// Encrypt and store a user's key for a provider (requires MASTER_KEY)
    Set {
        user_id: String,
        provider: String,
        secret: String,
    },
    /// Print a fresh base64 master key
    GenerateKey,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_defaults_match_single_worker_loop() {
        let cli = Cli::try_parse_from(["pipeline-worker", "run"]).unwrap();
        assert_eq!(cli.db, "mem://");
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.poll_interval, 5);
        assert_eq!(args.workers, 1);
        assert_eq!(args.results, ResultTarget::Database);
    }

    #[test]
    fn global_db_flag_follows_subcommand() {
        let cli = Cli::try_parse_from([
            "pipeline-worker",
            "enqueue",
            "L0_harvest",
            "--params",
            r#"{"query":"CRISPR"}"#,
            "--priority",
            "-2",
            "--db",
            "./ae.db",
        ])
        .unwrap();
        assert_eq!(cli.db, "./ae.db");
        let Command::Enqueue { job_type, priority, .. } = cli.command else {
            panic!("expected enqueue");
        };
        assert_eq!(job_type, "L0_harvest");
        assert_eq!(priority, -2);
    }
}
