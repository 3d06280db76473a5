//! nestlog-core - Offline-first sync engine for child-care events
//!
//! Writes land in a local libSQL store together with a queue of pending
//! remote mutations; the sync engine drives that queue to a remote store
//! through the [`gateway::RemoteGateway`] contract.

pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod models;
pub mod services;
pub mod sync;
pub mod util;
pub mod validation;

pub use config::{EngineConfig, RemoteConfig};
pub use error::{Error, Result};
pub use models::{Event, EventId, EventKind};
pub use services::LocalStore;
pub use sync::{SyncEngine, SyncReport};
