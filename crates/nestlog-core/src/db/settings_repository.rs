//! Settings repository implementation

use crate::error::{Error, Result};
use libsql::{Connection, Value as SqlValue};
use serde_json::Value;

use super::connection::Statement;

/// Trait for settings storage operations (async)
#[allow(async_fn_in_trait)]
pub trait SettingsRepository {
    /// Read a setting; `None` when the key was never written
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Write a setting, replacing any previous value
    async fn set(&self, key: &str, value: &Value) -> Result<()>;
}

/// libSQL implementation of `SettingsRepository`
pub struct LibSqlSettingsRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlSettingsRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn set_statement(key: &str, value: &Value) -> Result<Statement> {
        Ok(Statement::new(
            "INSERT INTO settings (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            vec![
                SqlValue::Text(key.to_string()),
                SqlValue::Text(serde_json::to_string(value)?),
            ],
        ))
    }

    pub const fn clear_statement() -> Statement {
        Statement::new("DELETE FROM settings", Vec::new())
    }
}

impl SettingsRepository for LibSqlSettingsRepository<'_> {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let mut rows = self
            .conn
            .query("SELECT value FROM settings WHERE key = ?", [key])
            .await?;

        let Some(row) = rows.next().await? else {
            return Ok(None);
        };
        let raw: String = row.get(0)?;
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|error| Error::Database(format!("Corrupt setting '{key}': {error}")))
    }

    async fn set(&self, key: &str, value: &Value) -> Result<()> {
        Self::set_statement(key, value)?.execute(self.conn).await?;
        Ok(())
    }
}
