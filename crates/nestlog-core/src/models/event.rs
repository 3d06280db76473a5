//! Event model

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Sort key used for events without a time of day
pub const DEFAULT_TIME_KEY: &str = "00:00";

/// A unique identifier for an event.
///
/// New ids are UUID v7 strings; ids received from the remote store are kept
/// verbatim since other clients may use a different scheme.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    /// Create a new unique event ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for EventId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for EventId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidInput("Event ID cannot be empty".into()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

/// The seven kinds of care events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Feed,
    Diaper,
    Sleep,
    Vitamin,
    Weight,
    Height,
    Other,
}

impl EventKind {
    /// All kinds, in the order remote reads are merged
    pub const ALL: [Self; 7] = [
        Self::Feed,
        Self::Diaper,
        Self::Sleep,
        Self::Vitamin,
        Self::Weight,
        Self::Height,
        Self::Other,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Feed => "feed",
            Self::Diaper => "diaper",
            Self::Sleep => "sleep",
            Self::Vitamin => "vitamin",
            Self::Weight => "weight",
            Self::Height => "height",
            Self::Other => "other",
        }
    }

    /// Remote table holding rows of this kind
    pub const fn table_name(self) -> &'static str {
        match self {
            Self::Feed => "feeds",
            Self::Diaper => "diapers",
            Self::Sleep => "sleeps",
            Self::Vitamin => "vitamins",
            Self::Weight => "weights",
            Self::Height => "heights",
            Self::Other => "others",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let needle = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == needle || kind.table_name() == needle)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown event kind: {s}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedMethod {
    Breast,
    Bottle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedUnit {
    Ml,
    Oz,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreastSide {
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feed {
    pub time: String,
    pub method: FeedMethod,
    #[serde(default)]
    pub amount: Option<u32>,
    #[serde(default)]
    pub unit: Option<FeedUnit>,
    #[serde(default)]
    pub side: Option<BreastSide>,
    #[serde(default)]
    pub duration_sec: Option<u32>,
    #[serde(default)]
    pub milk_type: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diaper {
    pub time: String,
    pub pee: bool,
    pub poop: bool,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sleep {
    pub start: String,
    pub end: String,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vitamin {
    pub time: String,
    pub name: String,
    #[serde(default)]
    pub dose: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Weight {
    pub time: String,
    pub kg: f64,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Height {
    pub time: String,
    pub cm: f64,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Other {
    pub time: String,
    pub note: String,
}

/// Kind-specific event fields, discriminated by an explicit `kind` tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EventDetails {
    Feed(Feed),
    Diaper(Diaper),
    Sleep(Sleep),
    Vitamin(Vitamin),
    Weight(Weight),
    Height(Height),
    Other(Other),
}

impl EventDetails {
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Feed(_) => EventKind::Feed,
            Self::Diaper(_) => EventKind::Diaper,
            Self::Sleep(_) => EventKind::Sleep,
            Self::Vitamin(_) => EventKind::Vitamin,
            Self::Weight(_) => EventKind::Weight,
            Self::Height(_) => EventKind::Height,
            Self::Other(_) => EventKind::Other,
        }
    }

    /// Time of day used for ordering: `time`, or `start` for sleeps
    pub fn time_key(&self) -> &str {
        let time = match self {
            Self::Feed(feed) => &feed.time,
            Self::Diaper(diaper) => &diaper.time,
            Self::Sleep(sleep) => &sleep.start,
            Self::Vitamin(vitamin) => &vitamin.time,
            Self::Weight(weight) => &weight.time,
            Self::Height(height) => &height.time,
            Self::Other(other) => &other.time,
        };
        if time.trim().is_empty() {
            DEFAULT_TIME_KEY
        } else {
            time
        }
    }
}

/// A recorded care event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Client-assigned identifier, immutable after creation
    pub id: EventId,
    /// Owner reference
    #[serde(default)]
    pub user_id: Option<String>,
    /// Calendar day of the event
    pub date: NaiveDate,
    /// Set by the engine on creation
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Set by the engine on every accepted mutation
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub details: EventDetails,
}

impl Event {
    pub const fn kind(&self) -> EventKind {
        self.details.kind()
    }

    pub fn time_key(&self) -> &str {
        self.details.time_key()
    }

    /// Build an event from a caller payload of the given kind.
    ///
    /// Identity and timestamps are never taken from the payload.
    pub fn from_payload(kind: EventKind, payload: &Value, now: DateTime<Utc>) -> Result<Self> {
        let mut object = payload
            .as_object()
            .cloned()
            .ok_or_else(|| Error::InvalidInput("Event payload must be a JSON object".into()))?;
        object.remove("created_at");
        object.remove("updated_at");
        object.insert("id".into(), Value::String(EventId::new().to_string()));
        object.insert("kind".into(), Value::String(kind.as_str().to_string()));

        let mut event: Self = serde_json::from_value(Value::Object(object))?;
        event.created_at = Some(now);
        event.updated_at = Some(now);
        Ok(event)
    }

    /// Encode as a flat remote row; the kind is implied by the table.
    pub fn to_row(&self) -> Result<Value> {
        let mut value = serde_json::to_value(self)?;
        if let Some(object) = value.as_object_mut() {
            object.remove("kind");
        }
        Ok(value)
    }

    /// Decode a flat remote row read from the table of `kind`.
    pub fn from_row(kind: EventKind, row: Value) -> Result<Self> {
        let Value::Object(mut object) = row else {
            return Err(Error::InvalidInput(format!(
                "Expected a JSON object row from {}",
                kind.table_name()
            )));
        };
        object.insert("kind".into(), Value::String(kind.as_str().to_string()));
        Ok(serde_json::from_value(Value::Object(object))?)
    }

    /// Flat row with a partial set of fields applied on top of this event.
    ///
    /// `id`, `kind` and the engine timestamps cannot be changed this way.
    pub fn merged_row(&self, changes: &Value) -> Result<Value> {
        let changes = changes
            .as_object()
            .ok_or_else(|| Error::InvalidInput("Event changes must be a JSON object".into()))?;

        let mut row = self.to_row()?;
        let object = row
            .as_object_mut()
            .ok_or_else(|| Error::Database("Event did not encode as an object".into()))?;
        for (key, field) in changes {
            if matches!(
                key.as_str(),
                "id" | "kind" | "created_at" | "updated_at"
            ) {
                continue;
            }
            object.insert(key.clone(), field.clone());
        }
        Ok(row)
    }

    pub fn merged_with(&self, changes: &Value) -> Result<Self> {
        Self::from_row(self.kind(), self.merged_row(changes)?)
    }
}
