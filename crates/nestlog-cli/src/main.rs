//! nestlog - record child-care events offline and sync them later

mod cli;
mod commands;
mod config;
mod error;

#[cfg(test)]
mod tests;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, SettingsCommand};
use crate::commands::add::run_add;
use crate::commands::clear::run_clear;
use crate::commands::common::CliContext;
use crate::commands::completions::run_completions;
use crate::commands::delete::run_delete;
use crate::commands::edit::run_edit;
use crate::commands::failures::run_failures;
use crate::commands::list::run_list;
use crate::commands::queue::run_queue;
use crate::commands::settings::{run_settings_get, run_settings_set};
use crate::commands::sync::run_sync;
use crate::config::CliConfig;
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

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("nestlog=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Completions { shell, output } = &cli.command {
        return run_completions(*shell, output.as_deref());
    }

    let config = CliConfig::load()?;
    let context = CliContext::new(cli.db_path, config);

    match cli.command {
        Commands::Add {
            kind,
            payload,
            date,
        } => run_add(&context, kind, &payload, date).await?,
        Commands::List { date, json } => run_list(&context, date, json).await?,
        Commands::Edit { id, kind, changes } => run_edit(&context, &id, kind, &changes).await?,
        Commands::Delete { id, kind } => run_delete(&context, &id, kind).await?,
        Commands::Sync { json } => run_sync(&context, json).await?,
        Commands::Queue { json } => run_queue(&context, json).await?,
        Commands::Failures { limit, json } => run_failures(&context, limit, json).await?,
        Commands::Settings { command } => match command {
            SettingsCommand::Get { key } => run_settings_get(&context, &key).await?,
            SettingsCommand::Set { key, value } => {
                run_settings_set(&context, &key, &value).await?;
            }
        },
        Commands::Clear { yes } => run_clear(&context, yes).await?,
        Commands::Completions { .. } => {}
    }

    Ok(())
}
