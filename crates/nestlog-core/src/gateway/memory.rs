//! In-memory remote store for tests and offline demos

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use tokio::sync::Mutex;

use super::{GatewayError, GatewayResult, RemoteGateway};
use crate::models::{EventId, EventKind};

/// One call observed by an [`InMemoryGateway`], recorded before it is answered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    Insert { kind: EventKind, id: EventId },
    Update { kind: EventKind, id: EventId },
    Delete { kind: EventKind, id: EventId },
    Select { kind: EventKind, user_id: String },
}

#[derive(Default)]
struct State {
    tables: HashMap<EventKind, Vec<Value>>,
    online: bool,
    strict: bool,
    latency: Option<Duration>,
    failing_kinds: HashSet<EventKind>,
    injected: VecDeque<GatewayError>,
    calls: Vec<GatewayCall>,
}

/// Remote store kept in process memory.
///
/// Inserts ignore duplicates and deletes ignore missing rows, like the
/// PostgREST backend. Strict mode reports both as errors instead.
#[derive(Clone)]
pub struct InMemoryGateway {
    state: Arc<Mutex<State>>,
}

impl Default for InMemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::with_mode(false)
    }

    /// Report duplicate inserts as `AlreadyExists` and missing deletes as `NotFound`
    #[must_use]
    pub fn strict() -> Self {
        Self::with_mode(true)
    }

    fn with_mode(strict: bool) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                online: true,
                strict,
                ..State::default()
            })),
        }
    }

    pub async fn set_online(&self, online: bool) {
        self.state.lock().await.online = online;
    }

    /// Delay every call, to exercise request timeouts
    pub async fn set_latency(&self, latency: Option<Duration>) {
        self.state.lock().await.latency = latency;
    }

    /// Make every call for `kind` fail until cleared
    pub async fn fail_kind(&self, kind: EventKind, failing: bool) {
        let mut state = self.state.lock().await;
        if failing {
            state.failing_kinds.insert(kind);
        } else {
            state.failing_kinds.remove(&kind);
        }
    }

    /// Answer the next call with `error`; queued errors are consumed in order
    pub async fn fail_next(&self, error: GatewayError) {
        self.state.lock().await.injected.push_back(error);
    }

    /// Rows currently stored for `kind`, in insertion order
    pub async fn rows(&self, kind: EventKind) -> Vec<Value> {
        self.state
            .lock()
            .await
            .tables
            .get(&kind)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn contains(&self, kind: EventKind, id: &EventId) -> bool {
        self.rows(kind)
            .await
            .iter()
            .any(|row| row_id(row) == Some(id.as_str()))
    }

    /// Seed a row directly, bypassing the call log
    pub async fn seed(&self, kind: EventKind, row: Value) {
        self.state
            .lock()
            .await
            .tables
            .entry(kind)
            .or_default()
            .push(row);
    }

    pub async fn calls(&self) -> Vec<GatewayCall> {
        self.state.lock().await.calls.clone()
    }

    /// Log the call and decide whether it fails before touching any table
    async fn begin(&self, call: GatewayCall) -> GatewayResult<()> {
        let kind = match &call {
            GatewayCall::Insert { kind, .. }
            | GatewayCall::Update { kind, .. }
            | GatewayCall::Delete { kind, .. }
            | GatewayCall::Select { kind, .. } => *kind,
        };

        let latency = {
            let mut state = self.state.lock().await;
            state.calls.push(call);
            if !state.online {
                return Err(GatewayError::Unavailable("remote store is offline".into()));
            }
            if state.failing_kinds.contains(&kind) {
                return Err(GatewayError::Api {
                    status: 503,
                    message: format!("{} is unavailable", kind.table_name()),
                });
            }
            if let Some(error) = state.injected.pop_front() {
                return Err(error);
            }
            state.latency
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        Ok(())
    }
}

fn row_id(row: &Value) -> Option<&str> {
    row.get("id").and_then(Value::as_str)
}

fn require_id(row: &Value) -> GatewayResult<EventId> {
    row_id(row)
        .map(|id| EventId::from(id.to_string()))
        .ok_or_else(|| GatewayError::InvalidPayload("row has no string id".into()))
}

#[async_trait]
impl RemoteGateway for InMemoryGateway {
    async fn insert(&self, kind: EventKind, row: &Value) -> GatewayResult<()> {
        let id = require_id(row)?;
        self.begin(GatewayCall::Insert {
            kind,
            id: id.clone(),
        })
        .await?;

        let mut state = self.state.lock().await;
        let strict = state.strict;
        let table = state.tables.entry(kind).or_default();
        if table.iter().any(|stored| row_id(stored) == Some(id.as_str())) {
            if strict {
                return Err(GatewayError::AlreadyExists(id.to_string()));
            }
            return Ok(());
        }
        table.push(row.clone());
        Ok(())
    }

    async fn update_by_id(&self, kind: EventKind, id: &EventId, row: &Value) -> GatewayResult<()> {
        self.begin(GatewayCall::Update {
            kind,
            id: id.clone(),
        })
        .await?;

        let mut state = self.state.lock().await;
        let stored = state
            .tables
            .entry(kind)
            .or_default()
            .iter_mut()
            .find(|stored| row_id(stored) == Some(id.as_str()))
            .ok_or_else(|| GatewayError::NotFound(id.to_string()))?;
        *stored = row.clone();
        Ok(())
    }

    async fn delete_by_id(&self, kind: EventKind, id: &EventId) -> GatewayResult<()> {
        self.begin(GatewayCall::Delete {
            kind,
            id: id.clone(),
        })
        .await?;

        let mut state = self.state.lock().await;
        let strict = state.strict;
        let table = state.tables.entry(kind).or_default();
        let before = table.len();
        table.retain(|stored| row_id(stored) != Some(id.as_str()));
        if strict && table.len() == before {
            return Err(GatewayError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn select_by_user(
        &self,
        kind: EventKind,
        user_id: &str,
        date: Option<NaiveDate>,
    ) -> GatewayResult<Vec<Value>> {
        self.begin(GatewayCall::Select {
            kind,
            user_id: user_id.to_string(),
        })
        .await?;

        let date = date.map(|date| date.format("%Y-%m-%d").to_string());
        let state = self.state.lock().await;
        Ok(state
            .tables
            .get(&kind)
            .map(|rows| {
                rows.iter()
                    .filter(|row| row.get("user_id").and_then(Value::as_str) == Some(user_id))
                    .filter(|row| {
                        date.as_deref().map_or(true, |date| {
                            row.get("date").and_then(Value::as_str) == Some(date)
                        })
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
