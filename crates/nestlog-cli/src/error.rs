use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] nestlog_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid JSON argument: {0}")]
    InvalidJson(String),
    #[error("Setting key cannot be empty")]
    EmptySettingKey,
    #[error("Event ID cannot be empty")]
    EmptyEventId,
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("No user id configured. Set NESTLOG_USER_ID or `user_id` in the config file.")]
    MissingUserId,
    #[error(
        "Sync is not configured. Set NESTLOG_SUPABASE_URL and NESTLOG_SUPABASE_ANON_KEY, or `remote` in the config file."
    )]
    SyncNotConfigured,
    #[error("Refusing to wipe local data without --yes")]
    ConfirmationRequired,
}
