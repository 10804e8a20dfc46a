//! # Achievement Intel CLI
//!
//! Runs one tool operation and prints its JSON result to stdout. Logs go to
//! stderr. `achievement-intel --help` lists the commands.
//!
//! The configuration file comes from `--config` or `INTEL_CONFIG_PATH`;
//! without either, built-in defaults plus `INTEL_*` environment overrides are
//! used.

use achievement_intel::observability::{init_tracing, install_prometheus};
use achievement_intel::{IntelConfig, IntelService, SortStrategy};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, error};

/// Achievement intelligence from the command line
#[derive(Parser, Debug)]
#[command(name = "achievement-intel", version, about)]
struct Cli {
    /// Configuration file (YAML, JSON or TOML)
    #[arg(long, short, global = true, env = "INTEL_CONFIG_PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ranked plan for the locked achievements of a game
    Roadmap {
        game: String,
        /// efficiency, completion, missable or rarity
        #[arg(default_value = "efficiency")]
        strategy: SortStrategy,
    },
    /// Warnings about content that can be permanently missed
    Missables { game: String },
    /// What the player is doing right now
    Session { game: Option<String> },
    /// Prerequisite graph and readiness
    Dependencies { game: String },
    /// Merged schema and player progress
    Achievements { game: String },
    /// Global unlock percentages
    Rarity { game: String },
    /// Cache, limiter, breaker and executor counters
    Stats,
}

async fn load_config(path: Option<&PathBuf>) -> Result<IntelConfig> {
    match path {
        Some(path) => IntelConfig::load_from_file(path)
            .await
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => {
            let mut config = IntelConfig::default();
            config.apply_env_overrides()?;
            config.validate()?;
            Ok(config)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(service: &IntelService, command: Command) -> Result<()> {
    match command {
        Command::Roadmap { game, strategy } => print_json(&service.get_roadmap(&game, strategy).await?),
        Command::Missables { game } => print_json(&service.scan_for_missables(&game).await?),
        Command::Session { game } => print_json(&service.get_session_context(game.as_deref()).await?),
        Command::Dependencies { game } => print_json(&service.analyze_dependencies(&game).await?),
        Command::Achievements { game } => print_json(&service.get_achievements(&game).await?),
        Command::Rarity { game } => print_json(&service.get_global_rarity(&game).await?),
        Command::Stats => print_json(&service.get_stats().await?),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref()).await?;

    init_tracing(&config.observability.logging)?;
    install_prometheus(&config.observability.metrics)?;
    debug!(config = ?cli.config, "Configuration loaded");

    let service = IntelService::from_config(&config).await?;
    if let Err(e) = run(&service, cli.command).await {
        error!(error = %e, "Command failed");
        return Err(e);
    }
    Ok(())
}
