use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use fg_cli::commands::{attempt, sites, start, stats, status, unblock};
use fg_cli::{Cli, Commands, Config};

fn load_config(config_path: Option<&Path>) -> Result<Config> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let Some(command) = &cli.command else {
        // No subcommand, show help
        use clap::CommandFactory;
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let config = load_config(cli.config.as_deref())?;
    let mut stdout = io::stdout().lock();

    match command {
        Commands::Start { minutes, mode } => {
            start::run(&mut stdout, *minutes, mode.as_deref(), &config)?;
        }
        Commands::Status => status::run(&mut stdout, &config)?,
        Commands::Unblock => unblock::run(&mut stdout, &config)?,
        Commands::Sites(action) => sites::run(&mut stdout, action, &config)?,
        Commands::Attempt { url } => attempt::run(&mut stdout, url, &config)?,
        Commands::Stats(action) => stats::run(&mut stdout, action, &config)?,
    }

    Ok(())
}
