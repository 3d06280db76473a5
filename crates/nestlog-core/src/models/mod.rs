//! Data models for Nestlog

mod event;
mod sync_queue;

pub use event::{
    BreastSide, Diaper, Event, EventDetails, EventId, EventKind, Feed, FeedMethod, FeedUnit,
    Height, Other, Sleep, Vitamin, Weight, DEFAULT_TIME_KEY,
};
pub use sync_queue::{NewSyncQueueItem, SyncFailure, SyncOperation, SyncQueueItem};
