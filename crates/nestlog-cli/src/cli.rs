use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use nestlog_core::EventKind;

#[derive(Parser)]
#[command(name = "nestlog")]
#[command(about = "Record child-care events offline and sync them when online")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Record a new event
    #[command(alias = "new")]
    Add {
        /// Event kind (feed, diaper, sleep, vitamin, weight, height, other)
        #[arg(value_parser = parse_kind)]
        kind: EventKind,
        /// Event fields as a JSON object
        payload: String,
        /// Day of the event (defaults to today)
        #[arg(long, value_name = "YYYY-MM-DD")]
        date: Option<NaiveDate>,
    },
    /// List events, remote first with local fallback
    List {
        /// Only events on this day
        #[arg(long, value_name = "YYYY-MM-DD")]
        date: Option<NaiveDate>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change fields of an existing event
    Edit {
        /// Event ID
        id: String,
        /// Event kind
        #[arg(value_parser = parse_kind)]
        kind: EventKind,
        /// Changed fields as a JSON object
        changes: String,
    },
    /// Delete an event
    #[command(alias = "rm")]
    Delete {
        /// Event ID
        id: String,
        /// Event kind
        #[arg(value_parser = parse_kind)]
        kind: EventKind,
    },
    /// Push pending operations to the remote store
    Sync {
        /// Output the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show operations waiting to be pushed
    Queue {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show operations that exhausted their retries
    Failures {
        /// Number of failures to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Read or write local settings
    Settings {
        #[command(subcommand)]
        command: SettingsCommand,
    },
    /// Wipe all local events, pending operations, failures and settings
    Clear {
        /// Confirm the wipe
        #[arg(long)]
        yes: bool,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum SettingsCommand {
    /// Print a setting value
    Get { key: String },
    /// Store a setting value (JSON, or a plain string)
    Set { key: String, value: String },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

pub fn parse_kind(value: &str) -> Result<EventKind, String> {
    value
        .parse::<EventKind>()
        .map_err(|error| error.to_string())
}
