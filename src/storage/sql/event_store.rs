//! Shared SQL EventStore implementation.
//!
//! `SqlEventStore<DB>` holds the pool, the persistence strategy, the store
//! configuration, and the (at most one) open transaction. Statement
//! building is shared across backends; execution is generated per backend
//! by `impl_sql_event_store!`, the same way the iterator impls are.

use std::sync::Arc;

use sea_query::{
    Alias, DeleteStatement, Expr, InsertStatement, Order, Query, SelectStatement, SimpleExpr,
    Table, TableDropStatement, UpdateStatement,
};
use tokio::sync::Mutex;

use crate::config::{validate_identifier, StoreConfig};
use crate::envelope::{EventEnvelope, JsonMap, Stream, StreamName};
use crate::interfaces::event_store::{EventStoreError, Result};
use crate::metadata::MetadataMatcher;
use crate::storage::schema::EventStreams;
use crate::storage::strategy::PersistenceStrategy;

use super::SqlDialect;

/// SQL-backed implementation of the event store.
///
/// Generic over the database dialect; see `postgres::PostgresEventStore`
/// and `mysql::MysqlEventStore` for the concrete types.
pub struct SqlEventStore<DB: SqlDialect> {
    pool: DB::Pool,
    strategy: Arc<dyn PersistenceStrategy>,
    config: StoreConfig,
    tx: Mutex<Option<DB::Tx>>,
}

impl<DB: SqlDialect> SqlEventStore<DB> {
    /// Create a store over an existing pool.
    pub fn new(
        pool: DB::Pool,
        strategy: Arc<dyn PersistenceStrategy>,
        config: StoreConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            pool,
            strategy,
            config,
            tx: Mutex::new(None),
        })
    }

    /// The underlying pool.
    pub fn pool(&self) -> &DB::Pool {
        &self.pool
    }

    fn registry_table(&self) -> Alias {
        Alias::new(&self.config.event_streams_table)
    }

    fn registry_insert_stmt(
        &self,
        name: &StreamName,
        table: &str,
        metadata: &JsonMap,
    ) -> InsertStatement {
        Query::insert()
            .into_table(self.registry_table())
            .columns([
                EventStreams::RealStreamName,
                EventStreams::StreamName,
                EventStreams::Metadata,
            ])
            .values_panic([
                SimpleExpr::from(name.as_str()),
                SimpleExpr::from(table),
                SimpleExpr::from(serde_json::Value::Object(metadata.clone())),
            ])
            .to_owned()
    }

    fn insert_events_stmt(&self, table: &str, events: &[EventEnvelope]) -> Result<InsertStatement> {
        let columns = self.strategy.column_names();
        let values = self.strategy.prepare_data(events)?;
        let mut stmt = Query::insert()
            .into_table(Alias::new(table))
            .columns(columns.iter().map(|c| Alias::new(*c)))
            .to_owned();
        for row in values.chunks(columns.len()) {
            stmt.values_panic(row.iter().cloned().map(SimpleExpr::from));
        }
        Ok(stmt)
    }

    fn registry_lookup_stmt(&self, name: &StreamName) -> SelectStatement {
        Query::select()
            .column(EventStreams::StreamName)
            .from(self.registry_table())
            .and_where(Expr::col(EventStreams::RealStreamName).eq(name.as_str()))
            .to_owned()
    }

    fn metadata_select_stmt(&self, name: &StreamName) -> SelectStatement {
        Query::select()
            .column(EventStreams::Metadata)
            .from(self.registry_table())
            .and_where(Expr::col(EventStreams::RealStreamName).eq(name.as_str()))
            .to_owned()
    }

    fn metadata_update_stmt(&self, name: &StreamName, metadata: JsonMap) -> UpdateStatement {
        Query::update()
            .table(self.registry_table())
            .value(
                EventStreams::Metadata,
                SimpleExpr::from(serde_json::Value::Object(metadata)),
            )
            .and_where(Expr::col(EventStreams::RealStreamName).eq(name.as_str()))
            .to_owned()
    }

    fn registry_delete_stmt(&self, name: &StreamName) -> DeleteStatement {
        Query::delete()
            .from_table(self.registry_table())
            .and_where(Expr::col(EventStreams::RealStreamName).eq(name.as_str()))
            .to_owned()
    }

    fn stream_names_stmt(
        &self,
        filter: Option<&str>,
        limit: Option<u64>,
        offset: u64,
    ) -> SelectStatement {
        let mut stmt = Query::select()
            .column(EventStreams::RealStreamName)
            .from(self.registry_table())
            .order_by(EventStreams::RealStreamName, Order::Asc)
            .to_owned();
        if let Some(filter) = filter {
            stmt.and_where(Expr::col(EventStreams::RealStreamName).eq(filter));
        }
        // MySQL cannot express OFFSET without LIMIT
        match (limit, offset) {
            (Some(limit), offset) => {
                stmt.limit(limit);
                if offset > 0 {
                    stmt.offset(offset);
                }
            }
            (None, offset) if offset > 0 => {
                stmt.limit(u64::MAX);
                stmt.offset(offset);
            }
            _ => {}
        }
        stmt
    }

    fn matcher_predicates(matcher: Option<&MetadataMatcher>) -> Result<Vec<String>> {
        match matcher {
            Some(matcher) => matcher
                .constraints()
                .iter()
                .map(DB::render_constraint)
                .collect(),
            None => Ok(Vec::new()),
        }
    }

    fn map_create_error(&self, error: EventStoreError, name: &StreamName) -> EventStoreError {
        match db_code(&error) {
            Some(code)
                if self
                    .strategy
                    .unique_violation_codes()
                    .contains(&code.as_str()) =>
            {
                EventStoreError::StreamExists(name.clone())
            }
            _ => error,
        }
    }

    fn map_append_error(&self, error: EventStoreError, name: &StreamName) -> EventStoreError {
        match db_code(&error) {
            Some(code)
                if self
                    .strategy
                    .unique_violation_codes()
                    .contains(&code.as_str()) =>
            {
                EventStoreError::Concurrency(error.to_string())
            }
            Some(code) if DB::table_missing_codes().contains(&code.as_str()) => {
                EventStoreError::StreamNotFound(name.clone())
            }
            _ => error,
        }
    }
}

fn drop_table_stmt(table: &str) -> TableDropStatement {
    Table::drop().table(Alias::new(table)).if_exists().to_owned()
}

fn db_code(error: &EventStoreError) -> Option<String> {
    if let EventStoreError::Database(sqlx::Error::Database(db)) = error {
        db.code().map(|code| code.into_owned())
    } else {
        None
    }
}

fn metadata_map(value: Option<serde_json::Value>) -> JsonMap {
    value
        .and_then(|v| v.as_object().cloned())
        .unwrap_or_default()
}

/// Generate the backend-specific half of the store for one dialect.
///
/// Everything that touches sqlx needs the concrete pool and row types, so
/// the trait impl is stamped out per backend, mirroring the dialect marker
/// modules in `super`.
macro_rules! impl_sql_event_store {
    ($db:ty, $row:ty, $feature:literal) => {
        #[cfg(feature = $feature)]
        impl SqlEventStore<$db> {
            /// Create the stream registry table when absent.
            pub async fn init(&self) -> crate::interfaces::event_store::Result<()> {
                let sql = <$db as SqlDialect>::registry_schema(&self.config.event_streams_table);
                self.execute_sql(&sql).await?;
                Ok(())
            }

            async fn execute_sql(&self, sql: &str) -> crate::interfaces::event_store::Result<u64> {
                let mut tx = self.tx.lock().await;
                let done = match tx.as_mut() {
                    Some(tx) => sqlx::query(sql).execute(&mut **tx).await?,
                    None => sqlx::query(sql).execute(&self.pool).await?,
                };
                Ok(done.rows_affected())
            }

            async fn fetch_all_sql(
                &self,
                sql: &str,
            ) -> crate::interfaces::event_store::Result<Vec<$row>> {
                let mut tx = self.tx.lock().await;
                let rows = match tx.as_mut() {
                    Some(tx) => sqlx::query(sql).fetch_all(&mut **tx).await?,
                    None => sqlx::query(sql).fetch_all(&self.pool).await?,
                };
                Ok(rows)
            }

            async fn fetch_optional_sql(
                &self,
                sql: &str,
            ) -> crate::interfaces::event_store::Result<Option<$row>> {
                let mut tx = self.tx.lock().await;
                let row = match tx.as_mut() {
                    Some(tx) => sqlx::query(sql).fetch_optional(&mut **tx).await?,
                    None => sqlx::query(sql).fetch_optional(&self.pool).await?,
                };
                Ok(row)
            }

            async fn assert_stream_exists(
                &self,
                stream_name: &StreamName,
            ) -> crate::interfaces::event_store::Result<()> {
                let sql = <$db as SqlDialect>::build_select(self.registry_lookup_stmt(stream_name));
                if self.fetch_optional_sql(&sql).await?.is_none() {
                    return Err(EventStoreError::StreamNotFound(stream_name.clone()));
                }
                Ok(())
            }

            async fn append_events(
                &self,
                stream_name: &StreamName,
                table: &str,
                events: &[EventEnvelope],
            ) -> crate::interfaces::event_store::Result<()> {
                let stmt = self.insert_events_stmt(table, events)?;
                let sql = <$db as SqlDialect>::build_insert(stmt);
                self.execute_sql(&sql)
                    .await
                    .map_err(|e| self.map_append_error(e, stream_name))?;
                Ok(())
            }

            /// Best-effort removal of the partially created stream. MySQL
            /// DDL auto-commits, so a failed `create` must compensate to
            /// keep the stream observably absent.
            async fn cleanup_failed_create(&self, stream_name: &StreamName, table: &str) {
                let delete = <$db as SqlDialect>::build_delete(self.registry_delete_stmt(stream_name));
                if let Err(error) = self.execute_sql(&delete).await {
                    tracing::warn!(stream = %stream_name, %error, "registry cleanup after aborted create failed");
                }
                let drop = <$db as SqlDialect>::build_drop(drop_table_stmt(table));
                if let Err(error) = self.execute_sql(&drop).await {
                    tracing::warn!(stream = %stream_name, %error, "table cleanup after aborted create failed");
                }
            }
        }

        #[cfg(feature = $feature)]
        #[async_trait::async_trait]
        impl crate::interfaces::event_store::EventStore for SqlEventStore<$db> {
            async fn create(&self, stream: Stream) -> crate::interfaces::event_store::Result<()> {
                let Stream {
                    name,
                    metadata,
                    events,
                } = stream;
                let table = self.strategy.table_name_for(&name);
                validate_identifier(&table)?;

                let sql = <$db as SqlDialect>::build_insert(
                    self.registry_insert_stmt(&name, &table, &metadata),
                );
                self.execute_sql(&sql)
                    .await
                    .map_err(|e| self.map_create_error(e, &name))?;

                for ddl in self.strategy.create_schema(&table) {
                    if let Err(error) = self.execute_sql(&ddl).await {
                        self.cleanup_failed_create(&name, &table).await;
                        return Err(error);
                    }
                }

                if !events.is_empty() {
                    if let Err(error) = self.append_events(&name, &table, &events).await {
                        self.cleanup_failed_create(&name, &table).await;
                        return Err(error);
                    }
                }

                tracing::debug!(stream = %name, table = %table, events = events.len(), "stream created");
                Ok(())
            }

            async fn append_to(
                &self,
                stream_name: &StreamName,
                events: Vec<EventEnvelope>,
            ) -> crate::interfaces::event_store::Result<()> {
                if events.is_empty() {
                    return Ok(());
                }
                let table = self.strategy.table_name_for(stream_name);
                validate_identifier(&table)?;
                self.append_events(stream_name, &table, &events).await?;
                tracing::debug!(stream = %stream_name, events = events.len(), "events appended");
                Ok(())
            }

            async fn load(
                &self,
                stream_name: &StreamName,
                from_no: i64,
                count: Option<u64>,
                matcher: Option<&MetadataMatcher>,
            ) -> crate::interfaces::event_store::Result<
                Box<dyn crate::interfaces::event_store::EventIterator>,
            > {
                self.assert_stream_exists(stream_name).await?;
                let table = self.strategy.table_name_for(stream_name);
                validate_identifier(&table)?;
                let predicates = Self::matcher_predicates(matcher)?;
                Ok(Box::new(super::SqlStreamIterator::<$db>::forward(
                    self.pool.clone(),
                    table,
                    from_no,
                    count,
                    self.config.load_batch_size,
                    predicates,
                )))
            }

            async fn load_reverse(
                &self,
                stream_name: &StreamName,
                from_no: Option<i64>,
                count: Option<u64>,
                matcher: Option<&MetadataMatcher>,
            ) -> crate::interfaces::event_store::Result<
                Box<dyn crate::interfaces::event_store::EventIterator>,
            > {
                self.assert_stream_exists(stream_name).await?;
                let table = self.strategy.table_name_for(stream_name);
                validate_identifier(&table)?;
                let predicates = Self::matcher_predicates(matcher)?;
                Ok(Box::new(super::SqlStreamIterator::<$db>::reverse(
                    self.pool.clone(),
                    table,
                    from_no.unwrap_or(i64::MAX),
                    count,
                    self.config.load_batch_size,
                    predicates,
                )))
            }

            async fn delete(
                &self,
                stream_name: &StreamName,
            ) -> crate::interfaces::event_store::Result<()> {
                let sql =
                    <$db as SqlDialect>::build_delete(self.registry_delete_stmt(stream_name));
                if self.execute_sql(&sql).await? == 0 {
                    return Err(EventStoreError::StreamNotFound(stream_name.clone()));
                }
                let table = self.strategy.table_name_for(stream_name);
                validate_identifier(&table)?;
                let drop = <$db as SqlDialect>::build_drop(drop_table_stmt(&table));
                self.execute_sql(&drop).await?;
                tracing::debug!(stream = %stream_name, "stream deleted");
                Ok(())
            }

            async fn has_stream(
                &self,
                stream_name: &StreamName,
            ) -> crate::interfaces::event_store::Result<bool> {
                let sql = <$db as SqlDialect>::build_select(self.registry_lookup_stmt(stream_name));
                Ok(self.fetch_optional_sql(&sql).await?.is_some())
            }

            async fn fetch_stream_metadata(
                &self,
                stream_name: &StreamName,
            ) -> crate::interfaces::event_store::Result<Option<JsonMap>> {
                let sql = <$db as SqlDialect>::build_select(self.metadata_select_stmt(stream_name));
                match self.fetch_optional_sql(&sql).await? {
                    None => Ok(None),
                    Some(row) => {
                        use sqlx::Row as _;
                        let value: Option<serde_json::Value> = row.try_get("metadata")?;
                        Ok(Some(metadata_map(value)))
                    }
                }
            }

            async fn update_stream_metadata(
                &self,
                stream_name: &StreamName,
                metadata: JsonMap,
            ) -> crate::interfaces::event_store::Result<()> {
                let sql = <$db as SqlDialect>::build_update(
                    self.metadata_update_stmt(stream_name, metadata),
                );
                if self.execute_sql(&sql).await? == 0 {
                    return Err(EventStoreError::StreamNotFound(stream_name.clone()));
                }
                Ok(())
            }

            async fn fetch_stream_names(
                &self,
                filter: Option<&str>,
                limit: Option<u64>,
                offset: u64,
            ) -> crate::interfaces::event_store::Result<Vec<StreamName>> {
                let sql = <$db as SqlDialect>::build_select(
                    self.stream_names_stmt(filter, limit, offset),
                );
                let rows = self.fetch_all_sql(&sql).await?;
                rows.iter()
                    .map(|row| {
                        use sqlx::Row as _;
                        let name: String = row.try_get("real_stream_name")?;
                        StreamName::new(name)
                    })
                    .collect()
            }

            async fn fetch_category_names(
                &self,
                limit: Option<u64>,
                offset: u64,
            ) -> crate::interfaces::event_store::Result<Vec<String>> {
                let names = self.fetch_stream_names(None, None, 0).await?;
                Ok(crate::storage::category_names(&names, limit, offset))
            }

            async fn begin_transaction(&self) -> crate::interfaces::event_store::Result<()> {
                let mut slot = self.tx.lock().await;
                if slot.is_some() {
                    return Err(EventStoreError::TransactionAlreadyStarted);
                }
                *slot = Some(self.pool.begin().await?);
                Ok(())
            }

            async fn commit(&self) -> crate::interfaces::event_store::Result<()> {
                let tx = self
                    .tx
                    .lock()
                    .await
                    .take()
                    .ok_or(EventStoreError::TransactionNotStarted)?;
                tx.commit().await?;
                Ok(())
            }

            async fn rollback(&self) -> crate::interfaces::event_store::Result<()> {
                let tx = self
                    .tx
                    .lock()
                    .await
                    .take()
                    .ok_or(EventStoreError::TransactionNotStarted)?;
                tx.rollback().await?;
                Ok(())
            }

            async fn in_transaction(&self) -> bool {
                self.tx.lock().await.is_some()
            }
        }
    };
}

#[cfg(feature = "postgres")]
impl_sql_event_store!(super::postgres::Postgres, sqlx::postgres::PgRow, "postgres");

#[cfg(feature = "mysql")]
impl_sql_event_store!(super::mysql::MySql, sqlx::mysql::MySqlRow, "mysql");

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::strategy::{PostgresAggregateStreamStrategy, PostgresSingleStreamStrategy};
    use sea_query::PostgresQueryBuilder;

    // Statement builders are dialect-independent; rendering with one
    // builder is enough to pin the SQL shape.
    fn build_insert(
        strategy: &dyn PersistenceStrategy,
        events: &[EventEnvelope],
    ) -> InsertStatement {
        let columns = strategy.column_names();
        let values = strategy.prepare_data(events).expect("prepares");
        let mut stmt = Query::insert()
            .into_table(Alias::new("_t"))
            .columns(columns.iter().map(|c| Alias::new(*c)))
            .to_owned();
        for row in values.chunks(columns.len()) {
            stmt.values_panic(row.iter().cloned().map(SimpleExpr::from));
        }
        stmt
    }

    #[test]
    fn insert_statement_has_one_tuple_per_event() {
        let events = vec![
            EventEnvelope::new("UserCreated", JsonMap::new()),
            EventEnvelope::new("UsernameChanged", JsonMap::new()),
        ];
        let sql = build_insert(&PostgresSingleStreamStrategy, &events)
            .to_string(PostgresQueryBuilder);
        assert!(sql.starts_with(r#"INSERT INTO "_t""#));
        assert!(sql.contains(r#""event_id", "event_name", "payload", "metadata", "created_at""#));
        assert_eq!(sql.matches("('").count(), 2, "one value tuple per event");
    }

    #[test]
    fn aggregate_insert_carries_explicit_position() {
        let events = vec![EventEnvelope::new("UserCreated", JsonMap::new())
            .with_metadata_entry(crate::envelope::AGGREGATE_VERSION_KEY, 1)];
        let sql = build_insert(&PostgresAggregateStreamStrategy, &events)
            .to_string(PostgresQueryBuilder);
        assert!(sql.contains(r#""no", "event_id""#));
    }

    #[test]
    fn drop_statement_is_guarded() {
        let sql = drop_table_stmt("_abc").to_string(PostgresQueryBuilder);
        assert_eq!(sql, r#"DROP TABLE IF EXISTS "_abc""#);
    }

    #[test]
    fn metadata_map_tolerates_null_and_non_objects() {
        assert!(metadata_map(None).is_empty());
        assert!(metadata_map(Some(serde_json::Value::Null)).is_empty());
        let map = metadata_map(Some(serde_json::json!({"owner": "ops"})));
        assert_eq!(map.get("owner"), Some(&serde_json::json!("ops")));
    }
}
