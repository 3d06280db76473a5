//! Retry and eviction policy over the store's queue primitives

use serde_json::{json, Value};

use crate::models::{
    Event, EventId, EventKind, NewSyncQueueItem, SyncFailure, SyncOperation, SyncQueueItem,
};
use crate::services::LocalStore;
use crate::util::{compact_text, now_utc};
use crate::Result;

/// What happened to a queue item after a failed attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    /// Still queued with the new retry count
    Retained(u32),
    /// Reached the retry ceiling and moved to the failure log
    Evicted(SyncFailure),
    /// Already removed by someone else; nothing to do
    Gone,
}

/// FIFO log of pending remote mutations.
///
/// Items are never reordered; retries keep their original enqueue timestamp.
#[derive(Clone)]
pub struct SyncQueue {
    store: LocalStore,
    max_retries: u32,
}

impl SyncQueue {
    pub fn new(store: LocalStore, max_retries: u32) -> Self {
        Self {
            store,
            max_retries: max_retries.max(1),
        }
    }

    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// A fresh item stamped now with no retries.
    pub fn new_item(
        operation: SyncOperation,
        kind: EventKind,
        record_id: EventId,
        data: Value,
    ) -> NewSyncQueueItem {
        NewSyncQueueItem {
            operation,
            kind,
            record_id,
            data,
            timestamp: now_utc(),
            retry_count: 0,
        }
    }

    /// Item carrying the full row of `event`.
    pub fn item_for(operation: SyncOperation, event: &Event) -> Result<NewSyncQueueItem> {
        Ok(Self::new_item(
            operation,
            event.kind(),
            event.id.clone(),
            event.to_row()?,
        ))
    }

    /// Delete items only carry the id.
    pub fn delete_item(kind: EventKind, id: &EventId) -> NewSyncQueueItem {
        Self::new_item(SyncOperation::Delete, kind, id.clone(), json!({ "id": id }))
    }

    pub async fn enqueue(&self, item: NewSyncQueueItem) -> Result<SyncQueueItem> {
        let item = self.store.enqueue(item).await?;
        tracing::debug!(
            "Queued {} of {} {}",
            item.operation,
            item.kind,
            item.record_id
        );
        Ok(item)
    }

    /// Snapshot of pending items, oldest first.
    pub async fn pending(&self) -> Result<Vec<SyncQueueItem>> {
        self.store.dequeue_all().await
    }

    pub async fn len(&self) -> Result<usize> {
        self.store.queue_len().await
    }

    /// Drop an item after the remote store confirmed it.
    pub async fn complete(&self, item: &SyncQueueItem) -> Result<bool> {
        self.store.remove_queue_item(&item.id).await
    }

    /// Whether an older item for the same record still waits ahead of `item`.
    pub async fn has_earlier_pending(&self, item: &SyncQueueItem) -> Result<bool> {
        self.store.has_earlier_pending(item).await
    }

    /// Count a failed attempt, evicting the item once it reaches the ceiling.
    pub async fn record_failure(&self, item: &SyncQueueItem, error: &str) -> Result<RetryOutcome> {
        let Some(retry_count) = self.store.increment_retry(&item.id).await? else {
            return Ok(RetryOutcome::Gone);
        };

        if retry_count < self.max_retries {
            return Ok(RetryOutcome::Retained(retry_count));
        }

        let failure = SyncFailure {
            queue_item_id: item.id.clone(),
            operation: item.operation,
            kind: item.kind,
            record_id: item.record_id.clone(),
            retry_count,
            last_error: compact_text(error),
            failed_at: now_utc(),
        };
        if self.store.record_failure(&failure).await? {
            Ok(RetryOutcome::Evicted(failure))
        } else {
            Ok(RetryOutcome::Gone)
        }
    }

    pub async fn failures(&self, limit: usize) -> Result<Vec<SyncFailure>> {
        self.store.list_failures(limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_MAX_RETRIES;
    use pretty_assertions::assert_eq;

    async fn queue() -> SyncQueue {
        let store = LocalStore::open_in_memory().await.unwrap();
        SyncQueue::new(store, DEFAULT_MAX_RETRIES)
    }

    fn delete_of(id: &str) -> NewSyncQueueItem {
        SyncQueue::delete_item(EventKind::Sleep, &EventId::from(id.to_string()))
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn enqueue_starts_with_zero_retries() {
        let queue = queue().await;
        let item = queue.enqueue(delete_of("s1")).await.unwrap();

        assert_eq!(item.retry_count, 0);
        assert_eq!(item.data, json!({"id": "s1"}));
        assert_eq!(queue.pending().await.unwrap(), vec![item]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn evicts_after_ceiling() {
        let queue = queue().await;
        let item = queue.enqueue(delete_of("s1")).await.unwrap();

        for attempt in 1..DEFAULT_MAX_RETRIES {
            assert_eq!(
                queue.record_failure(&item, "offline").await.unwrap(),
                RetryOutcome::Retained(attempt)
            );
        }

        let RetryOutcome::Evicted(failure) = queue.record_failure(&item, "offline").await.unwrap()
        else {
            panic!("expected eviction on attempt {DEFAULT_MAX_RETRIES}");
        };
        assert_eq!(failure.retry_count, DEFAULT_MAX_RETRIES);
        assert_eq!(failure.last_error, "offline");
        assert_eq!(queue.len().await.unwrap(), 0);
        assert_eq!(queue.failures(10).await.unwrap(), vec![failure]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failure_on_removed_item_is_gone() {
        let queue = queue().await;
        let item = queue.enqueue(delete_of("s1")).await.unwrap();
        assert!(queue.complete(&item).await.unwrap());

        assert_eq!(
            queue.record_failure(&item, "late error").await.unwrap(),
            RetryOutcome::Gone
        );
        assert!(queue.failures(10).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn retries_do_not_reorder() {
        let queue = queue().await;
        let first = queue.enqueue(delete_of("a")).await.unwrap();
        let second = queue.enqueue(delete_of("b")).await.unwrap();

        queue.record_failure(&first, "timeout").await.unwrap();

        let ids: Vec<_> = queue
            .pending()
            .await
            .unwrap()
            .into_iter()
            .map(|item| item.id)
            .collect();
        assert_eq!(ids, vec![first.id, second.id]);
    }
}
