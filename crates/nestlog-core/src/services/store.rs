//! Local durable store shared by the sync engine and its clients.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::db::{
    Database, EventRepository, LibSqlEventRepository, LibSqlSettingsRepository,
    LibSqlSyncQueueRepository, SettingsRepository, Statement, SyncQueueRepository,
};
use crate::models::{Event, EventId, NewSyncQueueItem, SyncFailure, SyncQueueItem};
use crate::util::now_utc;
use crate::Result;

/// Thread-safe store over one libSQL connection.
///
/// Every multi-table write runs in a single transaction.
#[derive(Clone)]
pub struct LocalStore {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
}

impl LocalStore {
    /// Open a store at the given filesystem path, creating parent directories.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        tracing::debug!("Opening local store at {}", db_path.display());
        let db = Database::open(&db_path).await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
        })
    }

    /// Open an in-memory store (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: None,
        })
    }

    /// Database file backing this store, if any.
    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// List a user's events, optionally for one day, in insertion order.
    pub async fn get(&self, user_id: &str, date: Option<NaiveDate>) -> Result<Vec<Event>> {
        let db = self.db.lock().await;
        LibSqlEventRepository::new(db.connection())
            .list(user_id, date)
            .await
    }

    pub async fn get_by_id(&self, id: &EventId) -> Result<Option<Event>> {
        let db = self.db.lock().await;
        LibSqlEventRepository::new(db.connection()).get(id).await
    }

    pub async fn add(&self, event: &Event) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlEventRepository::new(db.connection()).add(event).await
    }

    /// Replace a stored event, stamping `updated_at` in the same write.
    pub async fn update(&self, mut event: Event) -> Result<Event> {
        touch(&mut event);
        let db = self.db.lock().await;
        LibSqlEventRepository::new(db.connection())
            .update(&event)
            .await?;
        Ok(event)
    }

    /// Delete an event; absent ids are ignored.
    pub async fn delete(&self, id: &EventId) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlEventRepository::new(db.connection()).delete(id).await
    }

    /// Append a queue item under a fresh id.
    pub async fn enqueue(&self, item: NewSyncQueueItem) -> Result<SyncQueueItem> {
        let item = with_fresh_id(item);
        let db = self.db.lock().await;
        LibSqlSyncQueueRepository::new(db.connection())
            .enqueue(&item)
            .await?;
        Ok(item)
    }

    /// All pending queue items, oldest first.
    pub async fn dequeue_all(&self) -> Result<Vec<SyncQueueItem>> {
        let db = self.db.lock().await;
        LibSqlSyncQueueRepository::new(db.connection()).list().await
    }

    /// Remove a queue item; returns whether it was still queued.
    pub async fn remove_queue_item(&self, id: &str) -> Result<bool> {
        let db = self.db.lock().await;
        LibSqlSyncQueueRepository::new(db.connection())
            .remove(id)
            .await
    }

    /// Bump a queue item's retry count; `None` if it was already removed.
    pub async fn increment_retry(&self, id: &str) -> Result<Option<u32>> {
        let db = self.db.lock().await;
        LibSqlSyncQueueRepository::new(db.connection())
            .increment_retry(id)
            .await
    }

    pub async fn has_earlier_pending(&self, item: &SyncQueueItem) -> Result<bool> {
        let db = self.db.lock().await;
        LibSqlSyncQueueRepository::new(db.connection())
            .has_earlier_pending(item)
            .await
    }

    pub async fn queue_len(&self) -> Result<usize> {
        let db = self.db.lock().await;
        LibSqlSyncQueueRepository::new(db.connection()).len().await
    }

    /// Remove a queue item and log it as permanently failed, atomically.
    ///
    /// Returns `false` when the item had already left the queue.
    pub async fn record_failure(&self, failure: &SyncFailure) -> Result<bool> {
        let statements = [
            LibSqlSyncQueueRepository::record_failure_statement(failure),
            LibSqlSyncQueueRepository::remove_statement(&failure.queue_item_id),
        ];
        let affected = self.execute_atomic(&statements).await?;
        Ok(affected > 0)
    }

    /// Permanently failed queue items, newest first.
    pub async fn list_failures(&self, limit: usize) -> Result<Vec<SyncFailure>> {
        let db = self.db.lock().await;
        LibSqlSyncQueueRepository::new(db.connection())
            .list_failures(limit)
            .await
    }

    pub async fn get_setting(&self, key: &str) -> Result<Option<Value>> {
        let db = self.db.lock().await;
        LibSqlSettingsRepository::new(db.connection())
            .get(key)
            .await
    }

    pub async fn set_setting(&self, key: &str, value: &Value) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlSettingsRepository::new(db.connection())
            .set(key, value)
            .await
    }

    /// Empty events, queue, failure log and settings in one transaction.
    pub async fn clear_all(&self) -> Result<()> {
        let [queue, failures] = LibSqlSyncQueueRepository::clear_statements();
        let statements = [
            LibSqlEventRepository::clear_statement(),
            queue,
            failures,
            LibSqlSettingsRepository::clear_statement(),
        ];
        self.execute_atomic(&statements).await?;
        tracing::info!("Cleared local store");
        Ok(())
    }

    /// Insert an event together with its queue item.
    pub async fn add_with_queue(
        &self,
        event: &Event,
        item: NewSyncQueueItem,
    ) -> Result<SyncQueueItem> {
        let item = with_fresh_id(item);
        let statements = [
            LibSqlEventRepository::insert_statement(event)?,
            LibSqlSyncQueueRepository::enqueue_statement(&item)?,
        ];
        self.execute_atomic(&statements).await?;
        Ok(item)
    }

    /// Replace an event and enqueue the item built from the stamped event.
    ///
    /// `updated_at` becomes `max(now, previous)` before `make_item` sees it.
    pub async fn update_with_queue<F>(
        &self,
        mut event: Event,
        make_item: F,
    ) -> Result<(Event, SyncQueueItem)>
    where
        F: FnOnce(&Event) -> Result<NewSyncQueueItem>,
    {
        touch(&mut event);
        let item = with_fresh_id(make_item(&event)?);
        let statements = [
            LibSqlEventRepository::update_statement(&event)?,
            LibSqlSyncQueueRepository::enqueue_statement(&item)?,
        ];

        let db = self.db.lock().await;
        // The event row must exist; checked under the same lock as the write
        if LibSqlEventRepository::new(db.connection())
            .get(&event.id)
            .await?
            .is_none()
        {
            return Err(crate::Error::NotFound(event.id.to_string()));
        }
        db.execute_atomic(&statements).await?;
        Ok((event, item))
    }

    /// Delete an event (if present) and enqueue its remote delete.
    pub async fn delete_with_queue(
        &self,
        id: &EventId,
        item: NewSyncQueueItem,
    ) -> Result<SyncQueueItem> {
        let item = with_fresh_id(item);
        let statements = [
            LibSqlEventRepository::delete_statement(id),
            LibSqlSyncQueueRepository::enqueue_statement(&item)?,
        ];
        self.execute_atomic(&statements).await?;
        Ok(item)
    }

    async fn execute_atomic(&self, statements: &[Statement]) -> Result<u64> {
        let db = self.db.lock().await;
        db.execute_atomic(statements).await
    }
}

fn with_fresh_id(item: NewSyncQueueItem) -> SyncQueueItem {
    SyncQueueItem::from_new(Uuid::now_v7().to_string(), item)
}

/// Stamp `updated_at` so it never moves backwards.
fn touch(event: &mut Event) {
    let now = now_utc();
    event.updated_at = Some(event.updated_at.map_or(now, |previous| previous.max(now)));
}
