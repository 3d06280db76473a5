//! Offline-first sync engine.
//!
//! Every write commits locally together with its queue item before any
//! network activity. Immediate pushes then run as tracked tasks, and
//! [`SyncEngine::sync_pending_operations`] drains whatever is left in FIFO
//! order.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use futures::future::join_all;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::{broadcast, Mutex};
use tokio::task::{JoinError, JoinSet};

use super::queue::{RetryOutcome, SyncQueue};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::gateway::{GatewayError, GatewayResult, RemoteGateway};
use crate::models::{Event, EventId, EventKind, SyncFailure, SyncOperation, SyncQueueItem};
use crate::services::LocalStore;
use crate::util::now_utc;
use crate::validation::{SchemaRules, SchemaValidator};

/// Settings key holding the finish time of the last reconciliation pass
pub const LAST_SYNC_AT_KEY: &str = "last_sync_at";

const FAILURE_CHANNEL_CAPACITY: usize = 64;

/// Result of one immediate push task
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushOutcome {
    pub item_id: String,
    pub operation: SyncOperation,
    pub record_id: EventId,
    pub status: PushStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "lowercase")]
pub enum PushStatus {
    /// Confirmed remotely and removed from the queue
    Pushed,
    /// An older item for the same record is still queued; left for reconciliation
    Deferred,
    /// Remote call failed; the item stays queued
    Failed(String),
}

/// Summary of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Items in the snapshot
    pub processed: usize,
    pub succeeded: usize,
    /// Failed but still queued
    pub retried: usize,
    /// Evicted at the retry ceiling during this pass
    pub evicted: Vec<SyncFailure>,
}

impl SyncReport {
    pub const fn is_clean(&self) -> bool {
        self.succeeded == self.processed
    }
}

/// Applies queue items to the remote store.
#[derive(Clone)]
struct Dispatcher {
    queue: SyncQueue,
    gateway: Arc<dyn RemoteGateway>,
    timeout: Duration,
}

impl Dispatcher {
    async fn bounded<T, F>(&self, call: F) -> GatewayResult<T>
    where
        F: Future<Output = GatewayResult<T>>,
    {
        tokio::time::timeout(self.timeout, call)
            .await
            .unwrap_or_else(|_| {
                Err(GatewayError::Timeout(format!(
                    "no response within {} ms",
                    self.timeout.as_millis()
                )))
            })
    }

    /// Issue the remote call for `item`, treating replays as success.
    async fn apply(&self, item: &SyncQueueItem) -> GatewayResult<()> {
        match item.operation {
            SyncOperation::Create => self.insert(item).await,
            SyncOperation::Update => {
                let updated = self
                    .bounded(
                        self.gateway
                            .update_by_id(item.kind, &item.record_id, &item.data),
                    )
                    .await;
                match updated {
                    // The create never landed remotely; upsert by id
                    Err(GatewayError::NotFound(_)) => self.insert(item).await,
                    other => other,
                }
            }
            SyncOperation::Delete => {
                match self
                    .bounded(self.gateway.delete_by_id(item.kind, &item.record_id))
                    .await
                {
                    Err(GatewayError::NotFound(_)) => Ok(()),
                    other => other,
                }
            }
        }
    }

    async fn insert(&self, item: &SyncQueueItem) -> GatewayResult<()> {
        match self
            .bounded(self.gateway.insert(item.kind, &item.data))
            .await
        {
            Err(GatewayError::AlreadyExists(_)) => Ok(()),
            other => other,
        }
    }

    /// Immediate push of a freshly committed item.
    ///
    /// Failures leave the item queued without counting a retry.
    async fn push(self, item: SyncQueueItem) -> PushOutcome {
        let status = match self.queue.has_earlier_pending(&item).await {
            Ok(true) => {
                tracing::debug!(
                    "Deferring {} of {} until earlier queue items are synced",
                    item.operation,
                    item.record_id
                );
                PushStatus::Deferred
            }
            Ok(false) => self.push_now(&item).await,
            Err(error) => PushStatus::Failed(error.to_string()),
        };

        PushOutcome {
            item_id: item.id,
            operation: item.operation,
            record_id: item.record_id,
            status,
        }
    }

    async fn push_now(&self, item: &SyncQueueItem) -> PushStatus {
        if let Err(error) = self.apply(item).await {
            tracing::warn!(
                "Immediate {} of {} {} failed, left queued: {}",
                item.operation,
                item.kind,
                item.record_id,
                error
            );
            return PushStatus::Failed(error.to_string());
        }

        match self.queue.complete(item).await {
            Ok(_) => PushStatus::Pushed,
            Err(error) => {
                tracing::warn!("Pushed {} but could not dequeue it: {}", item.id, error);
                PushStatus::Failed(error.to_string())
            }
        }
    }
}

/// Immediate push tasks.
///
/// Dropping the set detaches the tasks, so a push outlives the engine.
#[derive(Default)]
struct PushTasks(JoinSet<PushOutcome>);

impl PushTasks {
    /// Collect pushes that already finished.
    fn reap(&mut self) {
        while let Some(joined) = self.0.try_join_next() {
            observe_push(joined);
        }
    }
}

impl Drop for PushTasks {
    fn drop(&mut self) {
        self.0.detach_all();
    }
}

fn observe_push(joined: std::result::Result<PushOutcome, JoinError>) -> Option<PushOutcome> {
    match joined {
        Ok(outcome) => {
            tracing::debug!(
                "Immediate {} of {} finished: {:?}",
                outcome.operation,
                outcome.record_id,
                outcome.status
            );
            Some(outcome)
        }
        Err(error) => {
            tracing::error!("Push task did not complete: {}", error);
            None
        }
    }
}

/// Orchestrates local writes, the sync queue and the remote gateway.
#[derive(Clone)]
pub struct SyncEngine {
    store: LocalStore,
    queue: SyncQueue,
    dispatcher: Dispatcher,
    validator: Arc<dyn SchemaValidator>,
    config: EngineConfig,
    pushes: Arc<Mutex<PushTasks>>,
    pass_lock: Arc<Mutex<()>>,
    failures: broadcast::Sender<SyncFailure>,
}

impl SyncEngine {
    /// Create an engine using the default schema rules.
    pub fn new(
        store: LocalStore,
        gateway: Arc<dyn RemoteGateway>,
        config: EngineConfig,
    ) -> Result<Self> {
        config.validate()?;
        let queue = SyncQueue::new(store.clone(), config.max_retries);
        let dispatcher = Dispatcher {
            queue: queue.clone(),
            gateway,
            timeout: config.request_timeout,
        };
        let (failures, _) = broadcast::channel(FAILURE_CHANNEL_CAPACITY);

        Ok(Self {
            store,
            queue,
            dispatcher,
            validator: Arc::new(SchemaRules::new()),
            config,
            pushes: Arc::new(Mutex::new(PushTasks::default())),
            pass_lock: Arc::new(Mutex::new(())),
            failures,
        })
    }

    /// Replace the schema validator.
    #[must_use]
    pub fn with_validator(mut self, validator: Arc<dyn SchemaValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub const fn store(&self) -> &LocalStore {
        &self.store
    }

    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Record a new event locally and queue its remote insert.
    pub async fn create_event(&self, kind: EventKind, payload: &Value) -> Result<Event> {
        self.validator
            .validate(kind, payload)
            .map_err(Error::Validation)?;

        let event = Event::from_payload(kind, payload, now_utc())?;
        let item = self
            .store
            .add_with_queue(&event, SyncQueue::item_for(SyncOperation::Create, &event)?)
            .await?;
        tracing::info!("Created {} {}", kind, event.id);

        self.schedule_push(item).await;
        Ok(event)
    }

    /// Apply partial changes to an event and queue its remote update.
    pub async fn update_event(
        &self,
        id: &EventId,
        kind: EventKind,
        changes: &Value,
    ) -> Result<Event> {
        let existing = self
            .store
            .get_by_id(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        ensure_kind(&existing, kind)?;

        let row = existing.merged_row(changes)?;
        self.validator
            .validate(kind, &row)
            .map_err(Error::Validation)?;
        let merged = Event::from_row(kind, row)?;

        let (event, item) = self
            .store
            .update_with_queue(merged, |event| {
                SyncQueue::item_for(SyncOperation::Update, event)
            })
            .await?;
        tracing::info!("Updated {} {}", kind, event.id);

        self.schedule_push(item).await;
        Ok(event)
    }

    /// Delete an event locally and queue its remote delete.
    ///
    /// Deleting an id that is not stored locally still queues the remote delete.
    pub async fn delete_event(&self, id: &EventId, kind: EventKind) -> Result<()> {
        if let Some(existing) = self.store.get_by_id(id).await? {
            ensure_kind(&existing, kind)?;
        }

        let item = self
            .store
            .delete_with_queue(id, SyncQueue::delete_item(kind, id))
            .await?;
        tracing::info!("Deleted {} {}", kind, id);

        self.schedule_push(item).await;
        Ok(())
    }

    async fn schedule_push(&self, item: SyncQueueItem) {
        if !self.config.immediate_push {
            return;
        }
        let dispatcher = self.dispatcher.clone();
        let mut pushes = self.pushes.lock().await;
        pushes.reap();
        pushes.0.spawn(dispatcher.push(item));
    }

    /// Wait for every in-flight immediate push and collect the outcomes.
    ///
    /// Pushes that finished before a later write were already logged and
    /// are not returned again.
    pub async fn wait_for_pushes(&self) -> Vec<PushOutcome> {
        let mut pushes = std::mem::take(&mut *self.pushes.lock().await);

        let mut outcomes = Vec::new();
        while let Some(joined) = pushes.0.join_next().await {
            if let Some(outcome) = observe_push(joined) {
                outcomes.push(outcome);
            }
        }
        outcomes
    }

    /// Immediate pushes not yet collected, finished or not.
    pub async fn tracked_pushes(&self) -> usize {
        self.pushes.lock().await.0.len()
    }

    /// Drain a snapshot of the queue against the remote store, oldest first.
    ///
    /// Only one pass runs at a time; a second caller waits for the first.
    pub async fn sync_pending_operations(&self) -> Result<SyncReport> {
        let _pass = self.pass_lock.lock().await;

        let items = self.queue.pending().await?;
        let mut report = SyncReport {
            processed: items.len(),
            ..SyncReport::default()
        };

        for item in &items {
            match self.dispatcher.apply(item).await {
                Ok(()) => {
                    self.queue.complete(item).await?;
                    report.succeeded += 1;
                }
                Err(error) => self.handle_failure(item, &error, &mut report).await?,
            }
        }

        self.store
            .set_setting(LAST_SYNC_AT_KEY, &json!(now_utc().to_rfc3339()))
            .await?;
        tracing::info!(
            "Sync pass finished: {} processed, {} synced, {} retried, {} evicted",
            report.processed,
            report.succeeded,
            report.retried,
            report.evicted.len()
        );
        Ok(report)
    }

    async fn handle_failure(
        &self,
        item: &SyncQueueItem,
        error: &GatewayError,
        report: &mut SyncReport,
    ) -> Result<()> {
        match self.queue.record_failure(item, &error.to_string()).await? {
            RetryOutcome::Retained(retry_count) => {
                tracing::warn!(
                    "Sync of {} {} {} failed (attempt {}/{}): {}",
                    item.operation,
                    item.kind,
                    item.record_id,
                    retry_count,
                    self.queue.max_retries(),
                    error
                );
                report.retried += 1;
            }
            RetryOutcome::Evicted(failure) => {
                tracing::error!(
                    "Giving up on {} of {} {} after {} attempts; local copy kept: {}",
                    failure.operation,
                    failure.kind,
                    failure.record_id,
                    failure.retry_count,
                    failure.last_error
                );
                // No subscribers is fine; the failure log is durable
                let _ = self.failures.send(failure.clone());
                report.evicted.push(failure);
            }
            RetryOutcome::Gone => {
                tracing::debug!("Queue item {} was removed during the pass", item.id);
            }
        }
        Ok(())
    }

    /// Read a user's events from the remote store, falling back to local data.
    ///
    /// Kinds that fail to load are dropped; only a total outage falls back.
    /// Results are stably ordered by time of day.
    pub async fn get_events(&self, user_id: &str, date: Option<NaiveDate>) -> Result<Vec<Event>> {
        let reads = EventKind::ALL.map(|kind| async move {
            let rows = self
                .dispatcher
                .bounded(self.dispatcher.gateway.select_by_user(kind, user_id, date))
                .await;
            (kind, rows)
        });

        let mut events = Vec::new();
        let mut failed = 0;
        for (kind, result) in join_all(reads).await {
            match result {
                Ok(rows) => events.extend(rows.into_iter().filter_map(|row| {
                    Event::from_row(kind, row)
                        .map_err(|error| {
                            tracing::warn!("Skipping malformed {} row: {}", kind, error);
                        })
                        .ok()
                })),
                Err(error) => {
                    failed += 1;
                    tracing::warn!("Failed to read {}: {}", kind.table_name(), error);
                }
            }
        }

        if failed == EventKind::ALL.len() {
            tracing::warn!("Remote store unreachable, reading local events");
            events = self.store.get(user_id, date).await?;
        }

        sort_by_time(&mut events);
        Ok(events)
    }

    /// Receive permanent failures as they are evicted.
    pub fn subscribe_failures(&self) -> broadcast::Receiver<SyncFailure> {
        self.failures.subscribe()
    }

    pub async fn pending_operations(&self) -> Result<Vec<SyncQueueItem>> {
        self.queue.pending().await
    }

    pub async fn failures(&self, limit: usize) -> Result<Vec<SyncFailure>> {
        self.queue.failures(limit).await
    }

    pub async fn last_sync_at(&self) -> Result<Option<DateTime<Utc>>> {
        let value = self.store.get_setting(LAST_SYNC_AT_KEY).await?;
        Ok(value
            .as_ref()
            .and_then(Value::as_str)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|at| at.with_timezone(&Utc)))
    }

    pub async fn get_setting(&self, key: &str) -> Result<Option<Value>> {
        self.store.get_setting(key).await
    }

    pub async fn set_setting(&self, key: &str, value: &Value) -> Result<()> {
        self.store.set_setting(key, value).await
    }

    /// Wipe all local data, including unsynced queue items.
    pub async fn clear_all(&self) -> Result<()> {
        self.store.clear_all().await
    }
}

fn ensure_kind(event: &Event, kind: EventKind) -> Result<()> {
    if event.kind() == kind {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "Event {} is a {}, not a {}",
            event.id,
            event.kind(),
            kind
        )))
    }
}

/// Stable sort by time of day; equal keys keep their merge order.
fn sort_by_time(events: &mut [Event]) {
    events.sort_by(|left, right| left.time_key().cmp(right.time_key()));
}
