//! podgrid: offline driver for the super-pod placement engine.
//!
//! Runs the same admission, placement and scoring steps the host scheduler
//! runs, against a JSON cluster snapshot on disk.
//!
//! # Usage
//!
//! ```text
//! podgrid validate --job job.json
//! podgrid place --cluster cluster.json --job job.json --format json
//! podgrid score --cluster cluster.json --job job.json --task-index 3
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::EngineArgs;

#[derive(Parser)]
#[command(
    name = "podgrid",
    about = "Topology-aware placement for NPU training jobs",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a job against the admission rules
    Validate {
        /// Job description (JSON)
        #[arg(short, long)]
        job: PathBuf,
        #[command(flatten)]
        engine: EngineArgs,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Place every task of a job onto a cluster snapshot
    Place {
        /// Cluster snapshot (JSON)
        #[arg(long)]
        cluster: PathBuf,
        /// Job description (JSON)
        #[arg(short, long)]
        job: PathBuf,
        #[command(flatten)]
        engine: EngineArgs,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Place a job, then show the node one task is pinned to
    Score {
        /// Cluster snapshot (JSON)
        #[arg(long)]
        cluster: PathBuf,
        /// Job description (JSON)
        #[arg(short, long)]
        job: PathBuf,
        #[command(flatten)]
        engine: EngineArgs,
        /// Index of the task to score
        #[arg(short, long)]
        task_index: usize,
    },
}

fn init_tracing(json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,podgrid=debug"))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json)?;

    match cli.command {
        Commands::Validate {
            job,
            engine,
            format,
        } => commands::validate::validate(&job, &engine, &format),
        Commands::Place {
            cluster,
            job,
            engine,
            format,
        } => commands::place::place(&cluster, &job, &engine, &format),
        Commands::Score {
            cluster,
            job,
            engine,
            task_index,
        } => commands::score::score(&cluster, &job, &engine, task_index),
    }
}
