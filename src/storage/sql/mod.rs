//! Unified SQL storage implementation.
//!
//! This module provides one `EventStore` implementation shared by the SQL
//! backends (PostgreSQL, MySQL), parameterized by database type using the
//! [`SqlDialect`] trait. The dialect supplies the pool and transaction
//! types, renders sea-query statements, translates metadata constraints
//! into SQL, and names the SQLSTATE codes that mean "table not found".

mod event_store;
mod iterator;
mod matcher;

pub use event_store::SqlEventStore;
pub use iterator::SqlStreamIterator;

use sea_query::{
    DeleteStatement, InsertStatement, SelectStatement, TableDropStatement, UpdateStatement,
};

use crate::envelope::JsonMap;
use crate::interfaces::event_store::{EventStoreError, Result};
use crate::metadata::MetadataConstraint;

/// Trait for SQL database backends.
///
/// Implementations are zero-sized marker types; everything they provide is
/// either an associated type or a static method, so the shared store can be
/// generated per backend by macro.
pub trait SqlDialect: Send + Sync + 'static {
    /// The connection pool type for this database.
    type Pool: Clone + Send + Sync;

    /// The transaction type held while a store transaction is open.
    type Tx: Send;

    /// Backend name for diagnostics.
    fn name() -> &'static str;

    /// Build a SQL string from a sea-query SELECT statement.
    fn build_select(stmt: SelectStatement) -> String;

    /// Build a SQL string from a sea-query INSERT statement.
    fn build_insert(stmt: InsertStatement) -> String;

    /// Build a SQL string from a sea-query UPDATE statement.
    fn build_update(stmt: UpdateStatement) -> String;

    /// Build a SQL string from a sea-query DELETE statement.
    fn build_delete(stmt: DeleteStatement) -> String;

    /// Build a SQL string from a sea-query DROP TABLE statement.
    fn build_drop(stmt: TableDropStatement) -> String;

    /// DDL creating the stream registry table when absent.
    fn registry_schema(table_name: &str) -> String;

    /// Translate one metadata constraint into a SQL predicate.
    fn render_constraint(constraint: &MetadataConstraint) -> Result<String>;

    /// SQLSTATE codes reporting a missing table.
    fn table_missing_codes() -> &'static [&'static str];
}

/// Decode a JSON column value that must hold an object.
pub(crate) fn json_object(value: serde_json::Value) -> Result<JsonMap> {
    match value {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(EventStoreError::Runtime(format!(
            "expected a JSON object column, got {other}"
        ))),
    }
}

#[cfg(feature = "postgres")]
pub mod postgres {
    //! PostgreSQL database backend.

    use sea_query::PostgresQueryBuilder;

    use super::*;

    /// PostgreSQL database marker type.
    pub struct Postgres;

    impl SqlDialect for Postgres {
        type Pool = sqlx::PgPool;
        type Tx = sqlx::Transaction<'static, sqlx::Postgres>;

        fn name() -> &'static str {
            "postgres"
        }

        fn build_select(stmt: SelectStatement) -> String {
            stmt.to_string(PostgresQueryBuilder)
        }

        fn build_insert(stmt: InsertStatement) -> String {
            stmt.to_string(PostgresQueryBuilder)
        }

        fn build_update(stmt: UpdateStatement) -> String {
            stmt.to_string(PostgresQueryBuilder)
        }

        fn build_delete(stmt: DeleteStatement) -> String {
            stmt.to_string(PostgresQueryBuilder)
        }

        fn build_drop(stmt: TableDropStatement) -> String {
            stmt.to_string(PostgresQueryBuilder)
        }

        fn registry_schema(table_name: &str) -> String {
            format!(
                r#"CREATE TABLE IF NOT EXISTS "{table_name}" (
    real_stream_name VARCHAR(150) NOT NULL,
    stream_name CHAR(41) NOT NULL,
    metadata JSONB,
    PRIMARY KEY (real_stream_name),
    UNIQUE (stream_name)
)"#
            )
        }

        fn render_constraint(constraint: &MetadataConstraint) -> Result<String> {
            super::matcher::render_postgres(constraint)
        }

        fn table_missing_codes() -> &'static [&'static str] {
            &["42P01"]
        }
    }

    /// PostgreSQL event store.
    pub type PostgresEventStore = super::SqlEventStore<Postgres>;
}

#[cfg(feature = "mysql")]
pub mod mysql {
    //! MySQL database backend.

    use sea_query::MysqlQueryBuilder;

    use super::*;

    /// MySQL database marker type.
    pub struct MySql;

    impl SqlDialect for MySql {
        type Pool = sqlx::MySqlPool;
        type Tx = sqlx::Transaction<'static, sqlx::MySql>;

        fn name() -> &'static str {
            "mysql"
        }

        fn build_select(stmt: SelectStatement) -> String {
            stmt.to_string(MysqlQueryBuilder)
        }

        fn build_insert(stmt: InsertStatement) -> String {
            stmt.to_string(MysqlQueryBuilder)
        }

        fn build_update(stmt: UpdateStatement) -> String {
            stmt.to_string(MysqlQueryBuilder)
        }

        fn build_delete(stmt: DeleteStatement) -> String {
            stmt.to_string(MysqlQueryBuilder)
        }

        fn build_drop(stmt: TableDropStatement) -> String {
            stmt.to_string(MysqlQueryBuilder)
        }

        fn registry_schema(table_name: &str) -> String {
            format!(
                r#"CREATE TABLE IF NOT EXISTS `{table_name}` (
    real_stream_name VARCHAR(150) COLLATE utf8mb4_bin NOT NULL,
    stream_name CHAR(41) COLLATE utf8mb4_bin NOT NULL,
    metadata JSON,
    PRIMARY KEY (real_stream_name),
    UNIQUE KEY ix_stream_name (stream_name)
) ENGINE = InnoDB DEFAULT CHARSET = utf8mb4 COLLATE = utf8mb4_bin"#
            )
        }

        fn render_constraint(constraint: &MetadataConstraint) -> Result<String> {
            super::matcher::render_mysql(constraint)
        }

        fn table_missing_codes() -> &'static [&'static str] {
            &["42S02"]
        }
    }

    /// MySQL event store.
    pub type MysqlEventStore = super::SqlEventStore<MySql>;
}
