mod commands;
mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "portalsync",
    version,
    about = "Extract, rewire and publish portal services in parallel batches"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every service definition in a target directory
    Run {
        /// Batch target directory (holds `list/`, `data/`, `logs/`)
        target: PathBuf,
        /// Deployment YAML (default: `<target>/portalsync.yaml`)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Validate the deployment config and every service definition
    Check {
        /// Batch target directory
        target: PathBuf,
        /// Deployment YAML (default: `<target>/portalsync.yaml`)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log_level);

    match cli.command {
        Commands::Run { target, config } => commands::run::execute(&target, config).await,
        Commands::Check { target, config } => commands::check::execute(&target, config),
    }
}
