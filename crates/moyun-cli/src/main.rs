//! MoYun CLI - drive the sync engine from the terminal
//!
//! Sync, replay the offline queue, manage backups and inspect devices for a
//! configured account.

mod cli;
mod commands;
mod config_profiles;
mod error;

#[cfg(test)]
mod tests;

use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::backup::run_backup;
use crate::commands::common::resolve_db_path;
use crate::commands::config::run_config;
use crate::commands::devices::run_devices;
use crate::commands::docs::run_docs;
use crate::commands::sync::{run_drain, run_pending, run_sync};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    for directive in ["moyun=info", "moyun_core=info"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path)?;
    let profile = cli.profile.as_deref();

    match cli.command {
        Commands::Sync { json } => run_sync(json, &db_path, profile).await?,
        Commands::Drain { json } => run_drain(json, &db_path, profile).await?,
        Commands::Pending { json, discard } => {
            run_pending(json, discard, &db_path, profile).await?;
        }
        Commands::Docs { command } => run_docs(command, &db_path, profile).await?,
        Commands::Backup { command } => run_backup(command, &db_path, profile).await?,
        Commands::Devices { command } => run_devices(command, &db_path, profile).await?,
        Commands::Config { command } => run_config(command, profile)?,
    }

    Ok(())
}
