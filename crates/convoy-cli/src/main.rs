//! Convoy - declarative release pipeline orchestrator
//!
//! The `convoy` command drives multi-stage release pipelines as remote CI
//! jobs, planned and re-entered through a behavior-tree engine.
//!
//! ## Commands
//!
//! - `run`: acquire the release lock and drive the pipeline to settlement
//! - `status`: render the persisted pipeline state without running anything

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::Level;

use convoy_core::{
    render_report, GithubClient, PipelineConfig, PipelineRunner, RemoteJobClient, RunOutcome,
};
use convoy_state::fakes::MemoryStateStore;
use convoy_state::{StateStore, SurrealStateStore};

#[derive(Parser)]
#[command(name = "convoy")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Declarative release pipeline orchestrator", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive the release pipeline to settlement
    Run {
        /// Path to the pipeline configuration file
        #[arg(short, long, default_value = "convoy.toml")]
        config: PathBuf,

        /// Build and print the plan without acquiring the lock or ticking
        #[arg(long)]
        dry_run: bool,
    },

    /// Render the persisted pipeline state
    Status {
        /// Path to the pipeline configuration file
        #[arg(short, long, default_value = "convoy.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    convoy_core::telemetry::init_tracing(cli.json, level);

    match cli.command {
        Commands::Run { config, dry_run } => cmd_run(&config, dry_run).await,
        Commands::Status { config } => cmd_status(&config).await,
    }
}

async fn build_runner(config_path: &PathBuf) -> Result<PipelineRunner> {
    let config = PipelineConfig::from_path(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    let store: Arc<dyn StateStore> = match config.storage.backend.as_str() {
        "memory" => Arc::new(MemoryStateStore::new()),
        "surreal" => Arc::new(SurrealStateStore::from_env().await?),
        other => anyhow::bail!("unknown storage backend {other:?}"),
    };

    let token = std::env::var(&config.remote.token_env)
        .with_context(|| format!("reading token from ${}", config.remote.token_env))?;
    let remote: Arc<dyn RemoteJobClient> =
        Arc::new(GithubClient::new(&token, config.remote.api_base.clone())?);

    Ok(PipelineRunner::new(config, store, remote))
}

async fn cmd_run(config_path: &PathBuf, dry_run: bool) -> Result<()> {
    let runner = build_runner(config_path).await?;

    if dry_run {
        let report = runner.preview().await?;
        println!("{}", render_report(&report));
        return Ok(());
    }

    match runner.run().await? {
        RunOutcome::LockHeld => {
            println!("another run holds the release lock; nothing to do");
            Ok(())
        }
        RunOutcome::Completed(report) => {
            println!("{}", render_report(&report));
            if report.status == convoy_core::Status::Success {
                Ok(())
            } else {
                std::process::exit(1);
            }
        }
    }
}

async fn cmd_status(config_path: &PathBuf) -> Result<()> {
    let runner = build_runner(config_path).await?;
    let report = runner.preview().await?;
    println!("{}", render_report(&report));
    Ok(())
}
