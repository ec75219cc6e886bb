mod cli;
mod commands;
mod config;
mod observability;
mod output;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Commands};
use output::print_error;

#[tokio::main]
async fn main() {
    if let Err(e) = dotenvy::dotenv()
        && !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
    {
        eprintln!("Warning: Failed to load .env file: {e}");
    }

    if let Err(e) = run().await {
        print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    let level = cli.log_level.as_deref().unwrap_or(&cfg.logging.level);
    observability::init_tracing_with_level(level);
    tracing::debug!(path = %cli.config, "Configuration loaded");

    let storage = commands::connect(&cfg).await?;

    match &cli.command {
        Commands::Migrate => commands::maintenance::migrate(&storage).await?,
        Commands::Sweep(args) => {
            commands::maintenance::sweep(Arc::new(storage), cfg.store.sweep.clone(), args).await?
        }
        Commands::Run => {
            commands::maintenance::run(Arc::new(storage), cfg.store.sweep.clone()).await?
        }
        Commands::Revoke(args) => commands::grants::revoke(&storage, args).await?,
        Commands::Lookup(args) => commands::grants::lookup(&storage, args).await?,
        Commands::Count => commands::grants::count(&storage).await?,
        Commands::Status => commands::maintenance::status(&storage, &cfg).await?,
    }

    Ok(())
}
