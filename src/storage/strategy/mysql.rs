//! MySQL table layouts.
//!
//! MySQL cannot index JSON accessors directly, so both layouts expose the
//! aggregate metadata through generated stored columns and index those.
//! Unique violations surface as SQLSTATE 23000.

use sea_query::Value;

use super::{flatten_rows, PersistenceStrategy, EVENT_COLUMNS};
use crate::envelope::EventEnvelope;
use crate::interfaces::event_store::Result;

const UNIQUE_VIOLATION: [&str; 1] = ["23000"];

const AGGREGATE_COLUMNS: [&str; 6] = [
    "no",
    "event_id",
    "event_name",
    "payload",
    "metadata",
    "created_at",
];

/// One table per logical stream, positions assigned by `AUTO_INCREMENT`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlSingleStreamStrategy;

impl PersistenceStrategy for MysqlSingleStreamStrategy {
    fn create_schema(&self, table_name: &str) -> Vec<String> {
        vec![format!(
            r#"CREATE TABLE `{table_name}` (
    no BIGINT NOT NULL AUTO_INCREMENT,
    event_id CHAR(36) COLLATE utf8mb4_bin NOT NULL,
    event_name VARCHAR(100) COLLATE utf8mb4_bin NOT NULL,
    payload JSON NOT NULL,
    metadata JSON NOT NULL,
    created_at CHAR(26) COLLATE utf8mb4_bin NOT NULL,
    aggregate_version BIGINT UNSIGNED GENERATED ALWAYS AS (JSON_EXTRACT(metadata, '$._aggregate_version')) STORED,
    aggregate_id CHAR(36) GENERATED ALWAYS AS (JSON_UNQUOTE(JSON_EXTRACT(metadata, '$._aggregate_id'))) STORED,
    aggregate_type VARCHAR(150) GENERATED ALWAYS AS (JSON_UNQUOTE(JSON_EXTRACT(metadata, '$._aggregate_type'))) STORED,
    PRIMARY KEY (no),
    UNIQUE KEY ix_event_id (event_id),
    UNIQUE KEY ix_unique_event (aggregate_type, aggregate_id, aggregate_version),
    KEY ix_query_aggregate (aggregate_type, aggregate_id, no)
) ENGINE = InnoDB DEFAULT CHARSET = utf8mb4 COLLATE = utf8mb4_bin"#
        )]
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
/// `_aggregate_version`; the generated version column stays unique.
#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlAggregateStreamStrategy;

impl PersistenceStrategy for MysqlAggregateStreamStrategy {
    fn create_schema(&self, table_name: &str) -> Vec<String> {
        vec![format!(
            r#"CREATE TABLE `{table_name}` (
    no BIGINT NOT NULL,
    event_id CHAR(36) COLLATE utf8mb4_bin NOT NULL,
    event_name VARCHAR(100) COLLATE utf8mb4_bin NOT NULL,
    payload JSON NOT NULL,
    metadata JSON NOT NULL,
    created_at CHAR(26) COLLATE utf8mb4_bin NOT NULL,
    aggregate_version BIGINT UNSIGNED GENERATED ALWAYS AS (JSON_EXTRACT(metadata, '$._aggregate_version')) STORED,
    PRIMARY KEY (no),
    UNIQUE KEY ix_event_id (event_id),
    UNIQUE KEY ix_aggregate_version (aggregate_version)
) ENGINE = InnoDB DEFAULT CHARSET = utf8mb4 COLLATE = utf8mb4_bin"#
        )]
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_stream_schema_shape() {
        let ddl = MysqlSingleStreamStrategy.create_schema("_abc123");
        assert_eq!(ddl.len(), 1);
        assert!(ddl[0].contains("CREATE TABLE `_abc123`"));
        assert!(ddl[0].contains("AUTO_INCREMENT"));
        assert!(ddl[0].contains("GENERATED ALWAYS AS (JSON_EXTRACT(metadata, '$._aggregate_version')) STORED"));
        assert!(ddl[0].contains("UNIQUE KEY ix_unique_event"));
    }

    #[test]
    fn aggregate_stream_has_no_auto_increment() {
        let ddl = MysqlAggregateStreamStrategy.create_schema("_abc123");
        assert!(!ddl[0].contains("AUTO_INCREMENT"));
        assert!(ddl[0].contains("UNIQUE KEY ix_aggregate_version"));
        assert_eq!(MysqlAggregateStreamStrategy.column_names()[0], "no");
    }

    #[test]
    fn unique_violation_codes_are_mysql_sqlstate() {
        assert_eq!(MysqlSingleStreamStrategy.unique_violation_codes(), &["23000"]);
    }
}
