use clap::Parser;
use pipeline_worker::{Cli, execute, init_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before parsing so env-backed flags see it
    dotenvy::dotenv().ok();
    init_tracing();

    execute(Cli::parse()).await
}
