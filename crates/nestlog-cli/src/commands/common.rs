use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use nestlog_core::gateway::{OfflineGateway, RemoteGateway, SessionContext, SupabaseGateway};
use nestlog_core::models::{SyncFailure, SyncQueueItem};
use nestlog_core::sync::{PushOutcome, PushStatus};
use nestlog_core::{Event, EventId, LocalStore, SyncEngine};
use serde_json::Value;

use crate::config::CliConfig;
use crate::error::CliError;

/// Resolved database location and configuration for one invocation
pub struct CliContext {
    pub db_path: PathBuf,
    pub config: CliConfig,
}

impl CliContext {
    pub fn new(cli_db_path: Option<PathBuf>, config: CliConfig) -> Self {
        let db_path = resolve_db_path(cli_db_path, &config);
        Self { db_path, config }
    }

    pub fn user_id(&self) -> Result<&str, CliError> {
        self.config.user_id.as_deref().ok_or(CliError::MissingUserId)
    }

    pub fn has_remote(&self) -> Result<bool, CliError> {
        Ok(self.config.remote.resolve()?.is_some())
    }

    /// Open the local store and wire it to the configured remote store.
    ///
    /// Without a remote the engine stays offline and skips immediate pushes.
    pub async fn engine(&self) -> Result<SyncEngine, CliError> {
        let store = LocalStore::open_path(&self.db_path).await?;
        let mut engine_config = self.config.engine.clone();

        let session = SessionContext::new(
            self.config.access_token.clone(),
            self.config.user_id.clone(),
        );
        let gateway: Arc<dyn RemoteGateway> =
            match SupabaseGateway::from_config(&self.config.remote, session)? {
                Some(gateway) => Arc::new(gateway),
                None => {
                    tracing::debug!("No remote store configured; working offline");
                    engine_config.immediate_push = false;
                    Arc::new(OfflineGateway)
                }
            };

        Ok(SyncEngine::new(store, gateway, engine_config)?)
    }
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>, config: &CliConfig) -> PathBuf {
    cli_db_path
        .or_else(|| config.db_path.clone())
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("nestlog")
        .join("nestlog.db")
}

pub fn parse_json_object(raw: &str) -> Result<Value, CliError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|error| CliError::InvalidJson(error.to_string()))?;
    if !value.is_object() {
        return Err(CliError::InvalidJson("expected a JSON object".to_string()));
    }
    Ok(value)
}

/// Parse a setting value as JSON, falling back to a plain string.
pub fn parse_setting_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

pub fn normalize_event_id(id: &str) -> Result<EventId, CliError> {
    id.parse::<EventId>().map_err(|_| CliError::EmptyEventId)
}

pub fn normalize_setting_key(key: &str) -> Result<String, CliError> {
    let trimmed = key.trim();
    if trimmed.is_empty() {
        return Err(CliError::EmptySettingKey);
    }
    Ok(trimmed.to_string())
}

/// One line per event: `date time kind id summary`
pub fn format_event_lines(events: &[Event]) -> Vec<String> {
    if events.is_empty() {
        return vec!["No events recorded.".to_string()];
    }

    events
        .iter()
        .map(|event| {
            format!(
                "{} {:>5}  {:<7}  {}  {}",
                event.date,
                event.time_key(),
                event.kind(),
                event.id,
                event_summary(event)
            )
        })
        .collect()
}

/// Kind-specific fields, excluding identity, date and timestamps
pub fn event_summary(event: &Event) -> String {
    let Ok(Value::Object(mut row)) = event.to_row() else {
        return String::new();
    };
    for key in ["id", "user_id", "date", "created_at", "updated_at"] {
        row.remove(key);
    }

    row.into_iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| match value {
            Value::String(text) => format!("{key}={text}"),
            other => format!("{key}={other}"),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn format_queue_lines(items: &[SyncQueueItem]) -> Vec<String> {
    if items.is_empty() {
        return vec!["No pending operations.".to_string()];
    }

    items
        .iter()
        .map(|item| {
            format!(
                "{}  {:<6}  {:<7}  {}  retries={}",
                format_timestamp(item.timestamp),
                item.operation,
                item.kind,
                item.record_id,
                item.retry_count
            )
        })
        .collect()
}

pub fn format_failure_lines(failures: &[SyncFailure]) -> Vec<String> {
    if failures.is_empty() {
        return vec!["No failed operations recorded.".to_string()];
    }

    failures
        .iter()
        .map(|failure| {
            format!(
                "{}  {:<6}  {:<7}  {}  after {} attempts: {}",
                format_timestamp(failure.failed_at),
                failure.operation,
                failure.kind,
                failure.record_id,
                failure.retry_count,
                failure.last_error
            )
        })
        .collect()
}

pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

/// Wait for the write's immediate push and say whether it is still pending.
pub async fn finish_pushes(engine: &SyncEngine) {
    for outcome in engine.wait_for_pushes().await {
        if let Some(line) = push_outcome_line(&outcome) {
            eprintln!("{line}");
        }
    }
}

pub fn push_outcome_line(outcome: &PushOutcome) -> Option<String> {
    match &outcome.status {
        PushStatus::Pushed => None,
        PushStatus::Deferred => Some(format!(
            "Saved locally; {} of {} waits for earlier pending operations",
            outcome.operation, outcome.record_id
        )),
        PushStatus::Failed(error) => Some(format!(
            "Saved locally; {} of {} will be retried on the next sync ({})",
            outcome.operation, outcome.record_id, error
        )),
    }
}
