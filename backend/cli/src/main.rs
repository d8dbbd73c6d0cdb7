mod next_cmd;
mod run_cmd;
mod standings_cmd;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use corpsewatch_config::{config_dir, config_file_path};

#[derive(Parser)]
#[command(name = "corpsewatch")]
#[command(about = "CorpseWatch: weekly chat activity tracker that names the corpse of the week")]
#[command(version)]
struct Cli {
    /// Path to config.yaml (defaults to $CORPSEWATCH_CONFIG_DIR or ~/.corpsewatch)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bot until interrupted
    Run,
    /// Print durable standings and who would be the corpse right now
    Standings,
    /// Print when the next weekly report fires
    NextReport,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli
        .config
        .unwrap_or_else(|| config_file_path(&config_dir()));

    match cli.command {
        Commands::Run => run_cmd::run(&config_path).await,
        Commands::Standings => standings_cmd::run(&config_path).await,
        Commands::NextReport => next_cmd::run(&config_path).await,
    }
}
