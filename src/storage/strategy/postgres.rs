//! PostgreSQL table layouts.
//!
//! Both layouts share the column set; they differ in how positions are
//! assigned and which functional indices enforce aggregate uniqueness.
//! PostgreSQL reports unique violations as SQLSTATE 23505 (with 23000 as
//! the integrity-violation class code).

use sea_query::Value;

use super::{flatten_rows, PersistenceStrategy, EVENT_COLUMNS};
use crate::envelope::EventEnvelope;
use crate::interfaces::event_store::Result;

const UNIQUE_VIOLATION: [&str; 2] = ["23000", "23505"];

const AGGREGATE_COLUMNS: [&str; 6] = [
    "no",
    "event_id",
    "event_name",
    "payload",
    "metadata",
    "created_at",
];

/// One table per logical stream, positions assigned by `BIGSERIAL`.
///
/// A functional unique index over the aggregate metadata triple enforces
/// one append per aggregate version even when many aggregates share the
/// table.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresSingleStreamStrategy;

impl PersistenceStrategy for PostgresSingleStreamStrategy {
    fn create_schema(&self, table_name: &str) -> Vec<String> {
        vec![
            format!(
                r#"CREATE TABLE "{table_name}" (
    no BIGSERIAL,
    event_id CHAR(36) NOT NULL,
    event_name VARCHAR(100) NOT NULL,
    payload JSON NOT NULL,
    metadata JSONB NOT NULL,
    created_at CHAR(26) NOT NULL,
    PRIMARY KEY (no),
    UNIQUE (event_id)
)"#
            ),
            format!(
                r#"CREATE UNIQUE INDEX ON "{table_name}" ((metadata->>'_aggregate_type'), (metadata->>'_aggregate_id'), (metadata->>'_aggregate_version'))"#
            ),
            format!(
                r#"CREATE INDEX ON "{table_name}" ((metadata->>'_aggregate_type'), (metadata->>'_aggregate_id'), no)"#
            ),
        ]
    }

    fn column_names(&self) -> &'static [&'static str] {
        &EVENT_COLUMNS
    }

    fn prepare_data(&self, events: &[EventEnvelope]) -> Result<Vec<Value>> {
        flatten_rows(events, false)
    }

    fn unique_violation_codes(&self) -> &'static [&'static str] {
        &UNIQUE_VIOLATION
    }
}

/// One aggregate instance per stream, positions written explicitly from
/// `_aggregate_version`, which keeps version numbering contiguous.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresAggregateStreamStrategy;

impl PersistenceStrategy for PostgresAggregateStreamStrategy {
    fn create_schema(&self, table_name: &str) -> Vec<String> {
        vec![
            format!(
                r#"CREATE TABLE "{table_name}" (
    no BIGSERIAL,
    event_id CHAR(36) NOT NULL,
    event_name VARCHAR(100) NOT NULL,
    payload JSON NOT NULL,
    metadata JSONB NOT NULL,
    created_at CHAR(26) NOT NULL,
    PRIMARY KEY (no),
    UNIQUE (event_id)
)"#
            ),
            format!(
                r#"CREATE UNIQUE INDEX ON "{table_name}" ((metadata->>'_aggregate_version'))"#
            ),
        ]
    }

    fn column_names(&self) -> &'static [&'static str] {
        &AGGREGATE_COLUMNS
    }

    fn prepare_data(&self, events: &[EventEnvelope]) -> Result<Vec<Value>> {
        flatten_rows(events, true)
    }

    fn unique_violation_codes(&self) -> &'static [&'static str] {
        &UNIQUE_VIOLATION
    }
}
