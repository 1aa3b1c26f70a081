//! errgroup - groups logged errors by embedding similarity.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::warn;

mod commands;

/// Groups error records by embedding similarity.
///
/// Records are read from a JSON array or YAML list (chosen by file
/// extension). Each record needs `id`, `error_type`, `message`, `severity`
/// and `timestamp`; records without `embedding` are ignored.
#[derive(Parser)]
#[command(name = "errgroup")]
#[command(about = "Group error records by embedding similarity")]
#[command(version)]
pub struct Cli {
    /// Records file (JSON or YAML)
    #[arg(short = 'f', long = "file", global = true)]
    pub input: Option<PathBuf>,

    /// Config file (YAML); flags override its values
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output file (default: stdout)
    #[arg(short = 'o', long, global = true)]
    pub output: Option<PathBuf>,

    /// Verbose output
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Cluster records into ranked error groups
    Groups(commands::GroupsCommand),
    /// Summarize a grouping that keeps singletons
    Stats(commands::StatsCommand),
    /// List the records most similar to one record
    Similar(commands::SimilarCommand),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling run");
            on_signal.cancel();
        }
    });

    match &cli.command {
        Commands::Groups(cmd) => cmd.run(&cli, &cancel).await,
        Commands::Stats(cmd) => cmd.run(&cli, &cancel).await,
        Commands::Similar(cmd) => cmd.run(&cli, &cancel).await,
    }
}
