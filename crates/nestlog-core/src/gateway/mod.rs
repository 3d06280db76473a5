//! Remote store access.
//!
//! The sync engine talks to the shared backend only through [`RemoteGateway`].
//! Rows cross this boundary as flat JSON objects; the event kind selects the
//! remote table.

mod memory;
mod supabase;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use thiserror::Error;

use crate::models::{EventId, EventKind};

pub use memory::{GatewayCall, InMemoryGateway};
pub use supabase::{SessionContext, SupabaseGateway};

/// Failure reported by a remote call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("Remote store unavailable: {0}")]
    Unavailable(String),
    #[error("Remote call timed out: {0}")]
    Timeout(String),
    #[error("HTTP request failed: {0}")]
    Http(String),
    #[error("Remote API error: {message} ({status})")]
    Api { status: u16, message: String },
    #[error("Record already exists: {0}")]
    AlreadyExists(String),
    #[error("Record not found: {0}")]
    NotFound(String),
    #[error("Invalid remote payload: {0}")]
    InvalidPayload(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout(error.to_string())
        } else if error.is_connect() {
            Self::Unavailable(error.to_string())
        } else {
            Self::Http(error.to_string())
        }
    }
}

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// Per-kind insert, update, delete and select against the remote store.
///
/// Implementations report outcomes as [`GatewayError`]; they never panic on
/// network failure.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    async fn insert(&self, kind: EventKind, row: &Value) -> GatewayResult<()>;

    async fn update_by_id(&self, kind: EventKind, id: &EventId, row: &Value) -> GatewayResult<()>;

    async fn delete_by_id(&self, kind: EventKind, id: &EventId) -> GatewayResult<()>;

    async fn select_by_user(
        &self,
        kind: EventKind,
        user_id: &str,
        date: Option<NaiveDate>,
    ) -> GatewayResult<Vec<Value>>;
}

/// Gateway for clients without a configured backend; every call is `Unavailable`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineGateway;

impl OfflineGateway {
    fn unavailable<T>() -> GatewayResult<T> {
        Err(GatewayError::Unavailable(
            "no remote store configured".to_string(),
        ))
    }
}

#[async_trait]
impl RemoteGateway for OfflineGateway {
    async fn insert(&self, _kind: EventKind, _row: &Value) -> GatewayResult<()> {
        Self::unavailable()
    }

    async fn update_by_id(
        &self,
        _kind: EventKind,
        _id: &EventId,
        _row: &Value,
    ) -> GatewayResult<()> {
        Self::unavailable()
    }

    async fn delete_by_id(&self, _kind: EventKind, _id: &EventId) -> GatewayResult<()> {
        Self::unavailable()
    }

    async fn select_by_user(
        &self,
        _kind: EventKind,
        _user_id: &str,
        _date: Option<NaiveDate>,
    ) -> GatewayResult<Vec<Value>> {
        Self::unavailable()
    }
}
