//! Sync queue and permanent failure log repository

#![allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)] // SQLite stores counts as i64

use libsql::{Connection, Value};

use super::connection::Statement;
use crate::error::{Error, Result};
use crate::models::{EventId, SyncFailure, SyncQueueItem};
use crate::util::from_millis;

/// Trait for sync queue storage operations (async)
#[allow(async_fn_in_trait)]
pub trait SyncQueueRepository {
    /// All pending items, oldest enqueue timestamp first
    async fn list(&self) -> Result<Vec<SyncQueueItem>>;

    /// Insert a queue item
    async fn enqueue(&self, item: &SyncQueueItem) -> Result<()>;

    /// Remove an item; returns whether it was still present
    async fn remove(&self, id: &str) -> Result<bool>;

    /// Bump an item's retry count, returning the new count if the item exists
    async fn increment_retry(&self, id: &str) -> Result<Option<u32>>;

    /// Whether an older item for the same record is still queued
    async fn has_earlier_pending(&self, item: &SyncQueueItem) -> Result<bool>;

    /// Number of pending items
    async fn len(&self) -> Result<usize>;

    /// Permanently failed items, newest first
    async fn list_failures(&self, limit: usize) -> Result<Vec<SyncFailure>>;
}

/// libSQL implementation of `SyncQueueRepository`
pub struct LibSqlSyncQueueRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlSyncQueueRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn enqueue_statement(item: &SyncQueueItem) -> Result<Statement> {
        Ok(Statement::new(
            "INSERT INTO sync_queue (id, operation, kind, record_id, data, timestamp, retry_count)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            vec![
                Value::Text(item.id.clone()),
                Value::Text(item.operation.as_str().to_string()),
                Value::Text(item.kind.as_str().to_string()),
                Value::Text(item.record_id.to_string()),
                Value::Text(serde_json::to_string(&item.data)?),
                Value::Integer(item.timestamp.timestamp_millis()),
                Value::Integer(i64::from(item.retry_count)),
            ],
        ))
    }

    pub fn remove_statement(id: &str) -> Statement {
        Statement::new(
            "DELETE FROM sync_queue WHERE id = ?",
            vec![Value::Text(id.to_string())],
        )
    }

    /// Log a failure for a queue item; writes nothing once the item is gone.
    ///
    /// Must run before the item's removal in the same transaction.
    pub fn record_failure_statement(failure: &SyncFailure) -> Statement {
        Statement::new(
            "INSERT INTO sync_failures
                (queue_item_id, operation, kind, record_id, retry_count, last_error, failed_at)
             SELECT ?, ?, ?, ?, ?, ?, ?
             WHERE EXISTS (SELECT 1 FROM sync_queue WHERE id = ?1)",
            vec![
                Value::Text(failure.queue_item_id.clone()),
                Value::Text(failure.operation.as_str().to_string()),
                Value::Text(failure.kind.as_str().to_string()),
                Value::Text(failure.record_id.to_string()),
                Value::Integer(i64::from(failure.retry_count)),
                Value::Text(failure.last_error.clone()),
                Value::Integer(failure.failed_at.timestamp_millis()),
            ],
        )
    }

    pub const fn clear_statements() -> [Statement; 2] {
        [
            Statement::new("DELETE FROM sync_queue", Vec::new()),
            Statement::new("DELETE FROM sync_failures", Vec::new()),
        ]
    }

    fn parse_item(row: &libsql::Row) -> Result<SyncQueueItem> {
        let record_id: String = row.get(3)?;
        let data: String = row.get(4)?;
        let timestamp: i64 = row.get(5)?;
        let retry_count: i64 = row.get(6)?;

        Ok(SyncQueueItem {
            id: row.get(0)?,
            operation: row.get::<String>(1)?.parse()?,
            kind: row.get::<String>(2)?.parse()?,
            record_id: EventId::from(record_id),
            data: serde_json::from_str(&data)?,
            timestamp: from_millis(timestamp)
                .ok_or_else(|| Error::Database(format!("Invalid queue timestamp {timestamp}")))?,
            retry_count: retry_count.max(0) as u32,
        })
    }

    fn parse_failure(row: &libsql::Row) -> Result<SyncFailure> {
        let retry_count: i64 = row.get(4)?;
        let failed_at: i64 = row.get(6)?;

        Ok(SyncFailure {
            queue_item_id: row.get(0)?,
            operation: row.get::<String>(1)?.parse()?,
            kind: row.get::<String>(2)?.parse()?,
            record_id: EventId::from(row.get::<String>(3)?),
            retry_count: retry_count.max(0) as u32,
            last_error: row.get(5)?,
            failed_at: from_millis(failed_at)
                .ok_or_else(|| Error::Database(format!("Invalid failure timestamp {failed_at}")))?,
        })
    }
}

impl SyncQueueRepository for LibSqlSyncQueueRepository<'_> {
    async fn list(&self) -> Result<Vec<SyncQueueItem>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, operation, kind, record_id, data, timestamp, retry_count
                 FROM sync_queue
                 ORDER BY timestamp ASC, seq ASC",
                (),
            )
            .await?;

        let mut items = Vec::new();
        while let Some(row) = rows.next().await? {
            items.push(Self::parse_item(&row)?);
        }
        Ok(items)
    }

    async fn enqueue(&self, item: &SyncQueueItem) -> Result<()> {
        Self::enqueue_statement(item)?.execute(self.conn).await?;
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        let rows = Self::remove_statement(id).execute(self.conn).await?;
        Ok(rows > 0)
    }

    async fn increment_retry(&self, id: &str) -> Result<Option<u32>> {
        let updated = self
            .conn
            .execute(
                "UPDATE sync_queue SET retry_count = retry_count + 1 WHERE id = ?",
                [id],
            )
            .await?;
        if updated == 0 {
            return Ok(None);
        }

        let mut rows = self
            .conn
            .query("SELECT retry_count FROM sync_queue WHERE id = ?", [id])
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row.get::<i64>(0)?.max(0) as u32)),
            None => Ok(None),
        }
    }

    async fn has_earlier_pending(&self, item: &SyncQueueItem) -> Result<bool> {
        let mut rows = self
            .conn
            .query(
                "SELECT EXISTS(
                    SELECT 1 FROM sync_queue
                    WHERE record_id = ?
                      AND seq < (SELECT seq FROM sync_queue WHERE id = ?)
                )",
                libsql::params![item.record_id.as_str(), item.id.as_str()],
            )
            .await?;

        Ok(rows
            .next()
            .await?
            .map(|row| row.get::<i32>(0))
            .transpose()?
            .is_some_and(|exists| exists != 0))
    }

    async fn len(&self) -> Result<usize> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM sync_queue", ())
            .await?;
        let count = match rows.next().await? {
            Some(row) => row.get::<i64>(0)?,
            None => 0,
        };
        Ok(count.max(0) as usize)
    }

    async fn list_failures(&self, limit: usize) -> Result<Vec<SyncFailure>> {
        let mut rows = self
            .conn
            .query(
                "SELECT queue_item_id, operation, kind, record_id, retry_count, last_error, failed_at
                 FROM sync_failures
                 ORDER BY failed_at DESC, id DESC
                 LIMIT ?",
                [limit as i64],
            )
            .await?;

        let mut failures = Vec::new();
        while let Some(row) = rows.next().await? {
            failures.push(Self::parse_failure(&row)?);
        }
        Ok(failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{EventKind, SyncOperation};
    use crate::util::now_utc;
    use chrono::Duration;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    fn item(id: &str, record: &str, offset_ms: i64) -> SyncQueueItem {
        SyncQueueItem {
            id: id.to_string(),
            operation: SyncOperation::Create,
            kind: EventKind::Feed,
            record_id: record.parse().unwrap(),
            data: json!({ "id": record }),
            timestamp: now_utc() + Duration::milliseconds(offset_ms),
            retry_count: 0,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_list_is_fifo_by_timestamp() {
        let db = setup().await;
        let repo = LibSqlSyncQueueRepository::new(db.connection());

        repo.enqueue(&item("late", "r1", 50)).await.unwrap();
        repo.enqueue(&item("early", "r2", 0)).await.unwrap();

        let ids = repo
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|item| item.id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["early".to_string(), "late".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_equal_timestamps_keep_insertion_order() {
        let db = setup().await;
        let repo = LibSqlSyncQueueRepository::new(db.connection());

        let mut first = item("first", "r1", 0);
        let mut second = item("second", "r1", 0);
        second.timestamp = first.timestamp;
        first.operation = SyncOperation::Create;
        second.operation = SyncOperation::Delete;
        repo.enqueue(&first).await.unwrap();
        repo.enqueue(&second).await.unwrap();

        let listed = repo.list().await.unwrap();
        assert_eq!(listed, vec![first, second]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_increment_retry_is_monotonic() {
        let db = setup().await;
        let repo = LibSqlSyncQueueRepository::new(db.connection());

        repo.enqueue(&item("q1", "r1", 0)).await.unwrap();
        assert_eq!(repo.increment_retry("q1").await.unwrap(), Some(1));
        assert_eq!(repo.increment_retry("q1").await.unwrap(), Some(2));
        assert_eq!(repo.list().await.unwrap()[0].retry_count, 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_increment_retry_missing_is_noop() {
        let db = setup().await;
        let repo = LibSqlSyncQueueRepository::new(db.connection());

        assert_eq!(repo.increment_retry("gone").await.unwrap(), None);
        assert_eq!(repo.len().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_remove_reports_presence() {
        let db = setup().await;
        let repo = LibSqlSyncQueueRepository::new(db.connection());

        repo.enqueue(&item("q1", "r1", 0)).await.unwrap();
        assert!(repo.remove("q1").await.unwrap());
        assert!(!repo.remove("q1").await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_has_earlier_pending() {
        let db = setup().await;
        let repo = LibSqlSyncQueueRepository::new(db.connection());

        let create = item("q1", "r1", 0);
        let delete = item("q2", "r1", 1);
        let unrelated = item("q3", "r2", 2);
        for queued in [&create, &delete, &unrelated] {
            repo.enqueue(queued).await.unwrap();
        }

        assert!(!repo.has_earlier_pending(&create).await.unwrap());
        assert!(repo.has_earlier_pending(&delete).await.unwrap());
        assert!(!repo.has_earlier_pending(&unrelated).await.unwrap());

        repo.remove("q1").await.unwrap();
        assert!(!repo.has_earlier_pending(&delete).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failures_round_trip() {
        let db = setup().await;
        let repo = LibSqlSyncQueueRepository::new(db.connection());

        let failure = SyncFailure {
            queue_item_id: "q1".to_string(),
            operation: SyncOperation::Update,
            kind: EventKind::Sleep,
            record_id: "r1".parse().unwrap(),
            retry_count: 5,
            last_error: "remote unavailable".to_string(),
            failed_at: now_utc(),
        };
        // Not queued yet: nothing is logged
        let written = LibSqlSyncQueueRepository::record_failure_statement(&failure)
            .execute(db.connection())
            .await
            .unwrap();
        assert_eq!(written, 0);

        repo.enqueue(&item("q1", "r1", 0)).await.unwrap();
        LibSqlSyncQueueRepository::record_failure_statement(&failure)
            .execute(db.connection())
            .await
            .unwrap();

        assert_eq!(repo.list_failures(10).await.unwrap(), vec![failure]);
        assert!(repo.list_failures(0).await.unwrap().is_empty());
    }
}
