//! Event repository implementation

use chrono::NaiveDate;
use libsql::{Connection, Value};

use super::connection::Statement;
use crate::error::{Error, Result};
use crate::models::{Event, EventId};

/// Trait for event storage operations (async)
#[allow(async_fn_in_trait)]
pub trait EventRepository {
    /// List a user's events, optionally restricted to one day, in insertion order
    async fn list(&self, user_id: &str, date: Option<NaiveDate>) -> Result<Vec<Event>>;

    /// Get an event by ID
    async fn get(&self, id: &EventId) -> Result<Option<Event>>;

    /// Insert a new event
    async fn add(&self, event: &Event) -> Result<()>;

    /// Replace a stored event's fields
    async fn update(&self, event: &Event) -> Result<()>;

    /// Delete an event (absent ids are ignored)
    async fn delete(&self, id: &EventId) -> Result<()>;
}

/// libSQL implementation of `EventRepository`
pub struct LibSqlEventRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlEventRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn insert_statement(event: &Event) -> Result<Statement> {
        Ok(Statement::new(
            "INSERT INTO events (id, user_id, date, kind, time_key, payload, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            Self::event_params(event)?,
        ))
    }

    pub fn update_statement(event: &Event) -> Result<Statement> {
        let mut params = Self::event_params(event)?;
        // Move the id to the WHERE clause position
        let id = params.remove(0);
        params.push(id);
        Ok(Statement::new(
            "UPDATE events
             SET user_id = ?, date = ?, kind = ?, time_key = ?, payload = ?, created_at = ?, updated_at = ?
             WHERE id = ?",
            params,
        ))
    }

    pub fn delete_statement(id: &EventId) -> Statement {
        Statement::new(
            "DELETE FROM events WHERE id = ?",
            vec![Value::Text(id.to_string())],
        )
    }

    pub const fn clear_statement() -> Statement {
        Statement::new("DELETE FROM events", Vec::new())
    }

    fn event_params(event: &Event) -> Result<Vec<Value>> {
        Ok(vec![
            Value::Text(event.id.to_string()),
            event.user_id.clone().map_or(Value::Null, Value::Text),
            Value::Text(event.date.format("%Y-%m-%d").to_string()),
            Value::Text(event.kind().as_str().to_string()),
            Value::Text(event.time_key().to_string()),
            Value::Text(serde_json::to_string(event)?),
            event
                .created_at
                .map_or(Value::Null, |at| Value::Integer(at.timestamp_millis())),
            event
                .updated_at
                .map_or(Value::Null, |at| Value::Integer(at.timestamp_millis())),
        ])
    }

    /// Parse an event from its stored payload column
    fn parse_event(row: &libsql::Row) -> Result<Event> {
        let payload: String = row.get(0)?;
        serde_json::from_str(&payload).map_err(|error| {
            Error::Database(format!("Corrupt event payload: {error}"))
        })
    }

    async fn collect(mut rows: libsql::Rows) -> Result<Vec<Event>> {
        let mut events = Vec::new();
        while let Some(row) = rows.next().await? {
            events.push(Self::parse_event(&row)?);
        }
        Ok(events)
    }
}

impl EventRepository for LibSqlEventRepository<'_> {
    async fn list(&self, user_id: &str, date: Option<NaiveDate>) -> Result<Vec<Event>> {
        let rows = if let Some(date) = date {
            self.conn
                .query(
                    "SELECT payload FROM events WHERE user_id = ? AND date = ? ORDER BY rowid",
                    libsql::params![user_id, date.format("%Y-%m-%d").to_string()],
                )
                .await?
        } else {
            self.conn
                .query(
                    "SELECT payload FROM events WHERE user_id = ? ORDER BY rowid",
                    [user_id],
                )
                .await?
        };

        Self::collect(rows).await
    }

    async fn get(&self, id: &EventId) -> Result<Option<Event>> {
        let mut rows = self
            .conn
            .query("SELECT payload FROM events WHERE id = ?", [id.as_str()])
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_event(&row)?)),
            None => Ok(None),
        }
    }

    async fn add(&self, event: &Event) -> Result<()> {
        Self::insert_statement(event)?.execute(self.conn).await?;
        Ok(())
    }

    async fn update(&self, event: &Event) -> Result<()> {
        let rows = Self::update_statement(event)?.execute(self.conn).await?;
        if rows == 0 {
            return Err(Error::NotFound(event.id.to_string()));
        }
        Ok(())
    }

    async fn delete(&self, id: &EventId) -> Result<()> {
        Self::delete_statement(id).execute(self.conn).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::EventKind;
    use crate::util::now_utc;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    fn diaper(user: &str, date: &str, time: &str) -> Event {
        Event::from_payload(
            EventKind::Diaper,
            &json!({
                "user_id": user,
                "date": date,
                "time": time,
                "pee": true,
                "poop": false
            }),
            now_utc(),
        )
        .unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_add_and_get() {
        let db = setup().await;
        let repo = LibSqlEventRepository::new(db.connection());

        let event = diaper("u1", "2024-03-01", "07:45");
        repo.add(&event).await.unwrap();

        let fetched = repo.get(&event.id).await.unwrap().unwrap();
        assert_eq!(fetched, event);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_list_filters_user_and_date() {
        let db = setup().await;
        let repo = LibSqlEventRepository::new(db.connection());

        let first = diaper("u1", "2024-03-01", "10:00");
        let second = diaper("u1", "2024-03-01", "06:00");
        repo.add(&first).await.unwrap();
        repo.add(&second).await.unwrap();
        repo.add(&diaper("u1", "2024-03-02", "08:00")).await.unwrap();
        repo.add(&diaper("u2", "2024-03-01", "08:00")).await.unwrap();

        let day = NaiveDate::from_ymd_opt(2024, 3, 1);
        let events = repo.list("u1", day).await.unwrap();
        assert_eq!(events, vec![first, second]);

        assert_eq!(repo.list("u1", None).await.unwrap().len(), 3);
        assert!(repo.list("nobody", None).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_update_replaces_fields() {
        let db = setup().await;
        let repo = LibSqlEventRepository::new(db.connection());

        let event = diaper("u1", "2024-03-01", "07:45");
        repo.add(&event).await.unwrap();

        let changed = event.merged_with(&json!({"poop": true})).unwrap();
        repo.update(&changed).await.unwrap();

        assert_eq!(repo.get(&event.id).await.unwrap().unwrap(), changed);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_update_missing_is_not_found() {
        let db = setup().await;
        let repo = LibSqlEventRepository::new(db.connection());

        let result = repo.update(&diaper("u1", "2024-03-01", "07:45")).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_delete_is_idempotent() {
        let db = setup().await;
        let repo = LibSqlEventRepository::new(db.connection());

        let event = diaper("u1", "2024-03-01", "07:45");
        repo.add(&event).await.unwrap();
        repo.delete(&event.id).await.unwrap();
        repo.delete(&event.id).await.unwrap();

        assert!(repo.get(&event.id).await.unwrap().is_none());
    }
}
