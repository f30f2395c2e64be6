use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use vigil_service::config::Config;
use vigil_service::orchestrator::Orchestrator;
use vigil_service::pool::open_pool;

#[derive(Debug, Parser)]
#[command(version, about = "Vigil monitoring engine")]
struct Cli {
    /// Config file, defaults to $XDG_CONFIG_HOME/vigil/config.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the monitoring engine until interrupted (default)
    Run,
    /// Print the effective configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_config(cli.config.as_deref())?;

    match cli.command.unwrap_or(Command::Run) {
        Command::ShowConfig => {
            println!("{config}");
            Ok(())
        }
        Command::Run => run(config).await,
    }
}

async fn run(config: Config) -> Result<()> {
    logger::init_tracing();
    info!("Starting Vigil monitoring engine...");

    let pool = open_pool(&config.database.path, config.database.pool_size).await?;
    let orchestrator = Orchestrator::start(&config, pool).await?;

    tokio::signal::ctrl_c().await?;
    orchestrator.shutdown().await;
    Ok(())
}
