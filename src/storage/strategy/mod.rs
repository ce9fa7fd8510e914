//! Dialect and table-layout policies.
//!
//! A [`PersistenceStrategy`] owns everything about the physical shape of a
//! stream table: its DDL, the column list used for inserts, how an event
//! batch flattens into a positional value vector, which SQLSTATE codes
//! signal a concurrency conflict, and how a stream name maps to a table
//! name.
//!
//! Four concrete variants are provided, PostgreSQL and MySQL crossed with
//! single-stream and aggregate-stream layouts.

mod mysql;
mod postgres;

pub use mysql::{MysqlAggregateStreamStrategy, MysqlSingleStreamStrategy};
pub use postgres::{PostgresAggregateStreamStrategy, PostgresSingleStreamStrategy};

use sea_query::Value;
use sha1::{Digest, Sha1};

use crate::envelope::{EventEnvelope, StreamName};
use crate::interfaces::event_store::{EventStoreError, Result};

/// Physical layout policy for stream tables.
pub trait PersistenceStrategy: Send + Sync {
    /// Ordered DDL statements creating the table and its indices.
    fn create_schema(&self, table_name: &str) -> Vec<String>;

    /// Ordered column identifiers for inserts.
    fn column_names(&self) -> &'static [&'static str];

    /// Flatten an event batch into a row-major positional value vector
    /// matching [`Self::column_names`] repeated per event.
    fn prepare_data(&self, events: &[EventEnvelope]) -> Result<Vec<Value>>;

    /// SQLSTATE codes that signal a unique-constraint conflict on append.
    fn unique_violation_codes(&self) -> &'static [&'static str];

    /// Physical table name for a stream.
    fn table_name_for(&self, stream_name: &StreamName) -> String {
        default_table_name(stream_name)
    }
}

/// Derive the physical table name: `"_" + sha1_hex(stream_name)`.
///
/// External callers never see this name; hex output keeps it a trivially
/// safe SQL identifier.
pub fn default_table_name(stream_name: &StreamName) -> String {
    let mut hasher = Sha1::new();
    hasher.update(stream_name.as_str().as_bytes());
    format!("_{}", hex::encode(hasher.finalize()))
}

/// Columns shared by every layout, in insert order (after any explicit
/// position column).
pub(crate) const EVENT_COLUMNS: [&str; 5] =
    ["event_id", "event_name", "payload", "metadata", "created_at"];

/// Flatten events row-major. With `with_position`, each row is prefixed by
/// an explicit `no` taken from the event's `_aggregate_version` metadata.
pub(crate) fn flatten_rows(events: &[EventEnvelope], with_position: bool) -> Result<Vec<Value>> {
    let width = EVENT_COLUMNS.len() + usize::from(with_position);
    let mut values = Vec::with_capacity(events.len() * width);
    for event in events {
        if with_position {
            let version = event.aggregate_version().ok_or_else(|| {
                EventStoreError::Runtime(format!(
                    "event {} carries no integral _aggregate_version metadata",
                    event.uuid
                ))
            })?;
            values.push(version.into());
        }
        values.push(event.uuid.to_string().into());
        values.push(event.event_name.clone().into());
        values.push(serde_json::Value::Object(event.payload.clone()).into());
        values.push(serde_json::Value::Object(event.metadata.clone()).into());
        values.push(event.created_at_string().into());
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{EventEnvelope, JsonMap, AGGREGATE_VERSION_KEY};

    fn stream(name: &str) -> StreamName {
        StreamName::new(name).expect("valid stream name")
    }

    #[test]
    fn table_name_is_prefixed_sha1_hex() {
        assert_eq!(
            default_table_name(&stream("user-123")),
            "_d5ecfb11836d0806d18f2fd4c815d970bdc54ddc"
        );
        assert_eq!(
            default_table_name(&stream("foo")),
            "_0beec7b5ea3f0fdbc95d0dd47f3c5bc275da8a33"
        );
        assert_eq!(
            default_table_name(&stream("$internal-345")),
            "_ede292efb86b04cd1d8a17def455ac6b883072f9"
        );
    }

    #[test]
    fn every_strategy_derives_the_same_table_name() {
        let name = stream("user-123");
        let expected = default_table_name(&name);
        let strategies: [&dyn PersistenceStrategy; 4] = [
            &PostgresSingleStreamStrategy,
            &PostgresAggregateStreamStrategy,
            &MysqlSingleStreamStrategy,
            &MysqlAggregateStreamStrategy,
        ];
        for strategy in strategies {
            assert_eq!(strategy.table_name_for(&name), expected);
        }
    }

    #[test]
    fn flatten_without_position_has_five_values_per_event() {
        let events = vec![
            EventEnvelope::new("UserCreated", JsonMap::new()),
            EventEnvelope::new("UsernameChanged", JsonMap::new()),
        ];
        let values = flatten_rows(&events, false).expect("flattens");
        assert_eq!(values.len(), 10);
    }

    #[test]
    fn flatten_with_position_prepends_aggregate_version() {
        let events = vec![EventEnvelope::new("UserCreated", JsonMap::new())
            .with_metadata_entry(AGGREGATE_VERSION_KEY, 4)];
        let values = flatten_rows(&events, true).expect("flattens");
        assert_eq!(values.len(), 6);
        assert_eq!(values[0], Value::from(4i64));
    }

    #[test]
    fn flatten_with_position_requires_aggregate_version() {
        let events = vec![EventEnvelope::new("UserCreated", JsonMap::new())];
        assert!(flatten_rows(&events, true).is_err());
    }
}
