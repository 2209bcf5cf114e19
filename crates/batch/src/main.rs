//! Citator batch CLI
//!
//! - `find-citations`: dispatch find-citations jobs to a worker queue
//! - `add-parallel-citations`: fill empty citation slots from citations
//!   that are repeatedly printed side by side

mod cli;
mod find_citations;
mod parallel_citations;
mod progress;
mod throttle;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command};
use citator_common::{config::AppConfig, db::DbPool, observability, Repository, VERSION};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

async fn run(cli: Cli) -> Result<()> {
    let config = AppConfig::load()?;
    observability::init_tracing(&config.observability);
    observability::install_metrics_exporter(&config.observability)?;

    info!("Starting citator v{}", VERSION);

    let db = DbPool::new(&config.database).await?;
    let repository = Repository::new(db);
    let shutdown = shutdown_flag();

    match cli.command {
        Command::FindCitations(args) => {
            let summary = find_citations::run(&config, &repository, &args, &shutdown).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::AddParallelCitations(args) => {
            let summary =
                parallel_citations::run(&config, &repository, &args, &shutdown).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}

/// Set once ctrl-c is received; long loops check it between units of work
fn shutdown_flag() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let handle = flag.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Shutdown signal received, finishing current unit of work");
            handle.store(true, Ordering::Relaxed);
        }
    });
    flag
}
