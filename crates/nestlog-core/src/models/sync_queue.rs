//! Pending remote mutation model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use super::{EventId, EventKind};
use crate::error::{Error, Result};

/// Remote mutation carried by a queue item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncOperation {
    Create,
    Update,
    Delete,
}

impl SyncOperation {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncOperation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(Error::Database(format!("Unknown sync operation: {other}"))),
        }
    }
}

/// A queue item before the store has assigned it an id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSyncQueueItem {
    pub operation: SyncOperation,
    pub kind: EventKind,
    pub record_id: EventId,
    /// Full row for create/update, `{id}` for delete
    pub data: Value,
    /// Enqueue time, the FIFO ordering key
    pub timestamp: DateTime<Utc>,
    pub retry_count: u32,
}

/// A pending remote mutation awaiting confirmation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncQueueItem {
    pub id: String,
    pub operation: SyncOperation,
    pub kind: EventKind,
    pub record_id: EventId,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
    pub retry_count: u32,
}

impl SyncQueueItem {
    pub fn from_new(id: impl Into<String>, item: NewSyncQueueItem) -> Self {
        Self {
            id: id.into(),
            operation: item.operation,
            kind: item.kind,
            record_id: item.record_id,
            data: item.data,
            timestamp: item.timestamp,
            retry_count: item.retry_count,
        }
    }
}

/// Queue item evicted after exhausting its retries.
///
/// The event stays correct locally but never reached the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFailure {
    /// Evicted queue item id
    pub queue_item_id: String,
    pub operation: SyncOperation,
    pub kind: EventKind,
    pub record_id: EventId,
    /// Attempts made before eviction
    pub retry_count: u32,
    /// Last error reported by the remote gateway
    pub last_error: String,
    pub failed_at: DateTime<Utc>,
}
