//! Database layer for nestlog

mod connection;
mod event_repository;
mod migrations;
mod queue_repository;
mod settings_repository;

pub use connection::{Database, Statement};
pub use event_repository::{EventRepository, LibSqlEventRepository};
pub use queue_repository::{LibSqlSyncQueueRepository, SyncQueueRepository};
pub use settings_repository::{LibSqlSettingsRepository, SettingsRepository};
