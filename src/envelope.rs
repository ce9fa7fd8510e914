//! Persisted event representation.
//!
//! An [`EventEnvelope`] is the unit of storage: a uuid-identified, named,
//! JSON-carrying record with a microsecond-precision creation instant and,
//! once persisted, a per-stream position.

use std::fmt;

use chrono::{NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::interfaces::event_store::{EventStoreError, Result};

/// String-keyed JSON mapping used for payloads and metadata.
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

/// Storage format for `created_at` columns: `YYYY-MM-DDTHH:MM:SS.uuuuuu`.
pub const CREATED_AT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Metadata key holding the aggregate version on aggregate-bound events.
pub const AGGREGATE_VERSION_KEY: &str = "_aggregate_version";
/// Metadata key holding the aggregate id on aggregate-bound events.
pub const AGGREGATE_ID_KEY: &str = "_aggregate_id";
/// Metadata key holding the aggregate type on aggregate-bound events.
pub const AGGREGATE_TYPE_KEY: &str = "_aggregate_type";

/// Name of a logical event stream.
///
/// Names starting with `$` denote internal streams, which wildcard
/// selectors (`from_all`, category selectors) skip.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamName(String);

impl StreamName {
    /// Create a stream name. Empty names are rejected.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(EventStoreError::InvalidStreamName(
                "stream name must not be empty".to_string(),
            ));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is an internal (`$`-prefixed) stream.
    pub fn is_internal(&self) -> bool {
        self.0.starts_with('$')
    }

    /// The category prefix, if the name has the form `category-rest`.
    pub fn category(&self) -> Option<&str> {
        match self.0.split_once('-') {
            Some((prefix, _)) if !prefix.is_empty() => Some(prefix),
            _ => None,
        }
    }

    /// Whether this stream belongs to the given category.
    pub fn in_category(&self, category: &str) -> bool {
        !self.is_internal()
            && self.0.len() > category.len()
            && self.0.as_bytes().get(category.len()) == Some(&b'-')
            && self.0.starts_with(category)
    }
}

impl fmt::Display for StreamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A persisted (or to-be-persisted) event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Globally unique event id.
    pub uuid: Uuid,
    /// Short type tag, at most 100 characters.
    pub event_name: String,
    /// Domain payload.
    pub payload: JsonMap,
    /// Infrastructure metadata.
    pub metadata: JsonMap,
    /// Creation instant, microsecond precision, UTC.
    pub created_at: NaiveDateTime,
    /// Per-stream position. `None` until the event has been persisted.
    pub no: Option<i64>,
}

impl EventEnvelope {
    /// Create a new envelope with a fresh uuid and the current instant.
    pub fn new(event_name: impl Into<String>, payload: JsonMap) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            event_name: event_name.into(),
            payload,
            metadata: JsonMap::new(),
            created_at: now_micros(),
            no: None,
        }
    }

    /// Replace the metadata mapping.
    pub fn with_metadata(mut self, metadata: JsonMap) -> Self {
        self.metadata = metadata;
        self
    }

    /// Set a single metadata entry.
    pub fn with_metadata_entry(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// The `_aggregate_version` metadata entry, if present and integral.
    pub fn aggregate_version(&self) -> Option<i64> {
        self.metadata.get(AGGREGATE_VERSION_KEY).and_then(|v| v.as_i64())
    }

    /// Render `created_at` in the storage format.
    pub fn created_at_string(&self) -> String {
        format_created_at(&self.created_at)
    }
}

/// A stream as handed to `create`: name, opaque metadata persisted once,
/// and the initial batch of events.
#[derive(Debug, Clone)]
pub struct Stream {
    pub name: StreamName,
    pub metadata: JsonMap,
    pub events: Vec<EventEnvelope>,
}

impl Stream {
    pub fn new(name: StreamName) -> Self {
        Self {
            name,
            metadata: JsonMap::new(),
            events: Vec::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: JsonMap) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_events(mut self, events: Vec<EventEnvelope>) -> Self {
        self.events = events;
        self
    }
}

/// Current UTC instant truncated to microsecond precision.
pub fn now_micros() -> NaiveDateTime {
    let now = Utc::now().naive_utc();
    let micros = now.nanosecond() / 1_000;
    now.with_nanosecond(micros * 1_000).unwrap_or(now)
}

/// Render an instant in the storage format (26 characters).
pub fn format_created_at(instant: &NaiveDateTime) -> String {
    instant.format(CREATED_AT_FORMAT).to_string()
}

/// Parse an instant from the storage format.
pub fn parse_created_at(text: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text.trim_end(), CREATED_AT_FORMAT)
        .map_err(|e| EventStoreError::InvalidTimestamp(format!("{text:?}: {e}")))
}
