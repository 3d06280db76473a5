//! Sync queue policy and the offline-first sync engine

mod engine;
mod queue;

pub use engine::{PushOutcome, PushStatus, SyncEngine, SyncReport, LAST_SYNC_AT_KEY};
pub use queue::{RetryOutcome, SyncQueue};
