//! Paged cursor over one stream table.
//!
//! The iterator owns a pool handle and re-issues the page SELECT with an
//! adjusted lower (or upper) bound whenever its buffer drains: strictly
//! past the last seen position, so no row is yielded twice. It terminates
//! once the requested count is produced or a page comes back short.

use std::collections::VecDeque;

use sea_query::{Alias, Expr, Order, Query, SelectStatement};

use crate::envelope::{parse_created_at, EventEnvelope};
use crate::interfaces::event_store::{EventIterator, EventStoreError, Result};
use crate::storage::schema::StreamEvents;

use super::SqlDialect;

/// Lazy page-at-a-time iterator over a stream's events.
pub struct SqlStreamIterator<DB: SqlDialect> {
    pool: DB::Pool,
    table: String,
    predicates: Vec<String>,
    from: i64,
    remaining: Option<u64>,
    batch_size: u64,
    buffer: VecDeque<EventEnvelope>,
    exhausted: bool,
    reverse: bool,
}

impl<DB: SqlDialect> SqlStreamIterator<DB> {
    /// Forward iterator: positions ascending from `from`.
    pub fn forward(
        pool: DB::Pool,
        table: String,
        from: i64,
        count: Option<u64>,
        batch_size: u64,
        predicates: Vec<String>,
    ) -> Self {
        Self {
            pool,
            table,
            predicates,
            from,
            remaining: count,
            batch_size,
            buffer: VecDeque::new(),
            exhausted: false,
            reverse: false,
        }
    }

    /// Reverse iterator: positions descending from `from`.
    pub fn reverse(
        pool: DB::Pool,
        table: String,
        from: i64,
        count: Option<u64>,
        batch_size: u64,
        predicates: Vec<String>,
    ) -> Self {
        Self {
            pool,
            table,
            predicates,
            from,
            remaining: count,
            batch_size,
            buffer: VecDeque::new(),
            exhausted: false,
            reverse: true,
        }
    }

    fn page_limit(&self) -> u64 {
        self.remaining.unwrap_or(u64::MAX).min(self.batch_size)
    }

    fn page_stmt(&self) -> SelectStatement {
        let mut stmt = Query::select()
            .columns([
                StreamEvents::No,
                StreamEvents::EventId,
                StreamEvents::EventName,
                StreamEvents::Payload,
                StreamEvents::Metadata,
                StreamEvents::CreatedAt,
            ])
            .from(Alias::new(&self.table))
            .to_owned();
        if self.reverse {
            stmt.and_where(Expr::col(StreamEvents::No).lte(self.from));
            stmt.order_by(StreamEvents::No, Order::Desc);
        } else {
            stmt.and_where(Expr::col(StreamEvents::No).gte(self.from));
            stmt.order_by(StreamEvents::No, Order::Asc);
        }
        for predicate in &self.predicates {
            stmt.and_where(Expr::cust(predicate.clone()));
        }
        stmt.limit(self.page_limit());
        stmt
    }

    /// Advance the window past the last fetched position and account for
    /// the page size. A short page means the table has no further matches.
    fn note_page(&mut self, fetched: u64, last_no: Option<i64>, asked: u64) {
        if let Some(no) = last_no {
            self.from = if self.reverse { no - 1 } else { no + 1 };
        }
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining = remaining.saturating_sub(fetched);
        }
        if fetched < asked {
            self.exhausted = true;
        }
    }
}

macro_rules! impl_sql_stream_iterator {
    ($db:ty, $row:ty, $feature:literal) => {
        #[cfg(feature = $feature)]
        impl SqlStreamIterator<$db> {
            fn decode_row(row: &$row) -> Result<EventEnvelope> {
                use sqlx::Row as _;
                let no: i64 = row.try_get("no")?;
                let event_id: String = row.try_get("event_id")?;
                let event_name: String = row.try_get("event_name")?;
                let payload: serde_json::Value = row.try_get("payload")?;
                let metadata: serde_json::Value = row.try_get("metadata")?;
                let created_at: String = row.try_get("created_at")?;
                Ok(EventEnvelope {
                    uuid: uuid::Uuid::parse_str(event_id.trim_end()).map_err(|e| {
                        EventStoreError::Runtime(format!("invalid event id {event_id:?}: {e}"))
                    })?,
                    event_name,
                    payload: super::json_object(payload)?,
                    metadata: super::json_object(metadata)?,
                    created_at: parse_created_at(&created_at)?,
                    no: Some(no),
                })
            }
        }

        #[cfg(feature = $feature)]
        #[async_trait::async_trait]
        impl EventIterator for SqlStreamIterator<$db> {
            async fn next(&mut self) -> Result<Option<EventEnvelope>> {
                loop {
                    if let Some(event) = self.buffer.pop_front() {
                        return Ok(Some(event));
                    }
                    if self.exhausted || self.remaining == Some(0) {
                        return Ok(None);
                    }
                    let asked = self.page_limit();
                    let sql = <$db as SqlDialect>::build_select(self.page_stmt());
                    let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
                    if rows.is_empty() {
                        self.exhausted = true;
                        return Ok(None);
                    }
                    for row in &rows {
                        let event = Self::decode_row(row)?;
                        self.buffer.push_back(event);
                    }
                    let last_no = self.buffer.back().and_then(|event| event.no);
                    self.note_page(rows.len() as u64, last_no, asked);
                }
            }
        }
    };
}

#[cfg(feature = "postgres")]
impl_sql_stream_iterator!(super::postgres::Postgres, sqlx::postgres::PgRow, "postgres");

#[cfg(feature = "mysql")]
impl_sql_stream_iterator!(super::mysql::MySql, sqlx::mysql::MySqlRow, "mysql");
