mod cli;
mod wiring;

use clap::Parser;
use cli::{Cli, Commands};
use mirror_common::Config;
use mirror_scheduler::JobKind;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing. Respect RUST_LOG env var; otherwise use defaults
    // based on the verbose flag.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "tmdb_mirror=trace,mirror_scheduler=trace,mirror_ingest=debug,mirror_upstream=debug,mirror_db=debug,mirror_server=debug,tower_http=debug".to_string()
        } else {
            "tmdb_mirror=debug,mirror_scheduler=info,mirror_ingest=info,mirror_server=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&env_filter))
        .init();

    let rt = tokio::runtime::Runtime::new()?;

    match cli.command {
        Commands::Serve => rt.block_on(serve()),
        Commands::FullSweep => rt.block_on(run_job(JobKind::FullSweep)),
        Commands::MissingIds => rt.block_on(run_job(JobKind::MissingIds)),
        Commands::PruneDeleted => rt.block_on(run_job(JobKind::PruneDeleted)),
        Commands::ChangesSync { force } => rt.block_on(run_job(JobKind::ChangesSync { force })),
        Commands::CreateTables => rt.block_on(run_job(JobKind::CreateTables)),
        Commands::AddMovie { id } => rt.block_on(run_job(JobKind::AddMovie { id })),
        Commands::AddSeries { id } => rt.block_on(run_job(JobKind::AddSeries { id })),
        Commands::TestWebhook { message } => rt.block_on(run_job(JobKind::TestWebhook { message })),
    }
}

async fn serve() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    tracing::info!("starting tmdb-mirror");
    wiring::serve(config).await?;
    Ok(())
}

/// Builds a one-shot job context and runs `kind` to completion in-process,
/// bypassing the scheduler's queue and single-flight lock — those only
/// matter when CRON, CLI, and REST share one long-lived `serve` process.
async fn run_job(kind: JobKind) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    let ctx = wiring::build_job_context(&config).await?;

    match wiring::run_one_shot(&ctx, kind).await {
        Ok(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "job failed");
            Err(Box::new(e))
        }
    }
}
