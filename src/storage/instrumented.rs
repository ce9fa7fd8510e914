//! Operation-logging store decorator.
//!
//! Wraps any `EventStore` and logs every operation with its outcome.
//! Decorators implementing the same trait compose by nesting, which keeps
//! interception points (logging here, transaction management elsewhere)
//! without routing calls through a shared event bus.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::envelope::{EventEnvelope, JsonMap, Stream, StreamName};
use crate::interfaces::event_store::{EventIterator, EventStore, Result};
use crate::metadata::MetadataMatcher;

/// Logging decorator around an event store.
pub struct InstrumentedEventStore {
    inner: Arc<dyn EventStore>,
}

impl InstrumentedEventStore {
    pub fn new(inner: Arc<dyn EventStore>) -> Self {
        Self { inner }
    }
}

fn observe<T>(op: &'static str, result: Result<T>) -> Result<T> {
    match &result {
        Ok(_) => debug!(op, "event store call succeeded"),
        Err(error) => warn!(op, %error, "event store call failed"),
    }
    result
}

#[async_trait]
impl EventStore for InstrumentedEventStore {
    async fn create(&self, stream: Stream) -> Result<()> {
        debug!(stream = %stream.name, events = stream.events.len(), "create");
        observe("create", self.inner.create(stream).await)
    }

    async fn append_to(&self, stream_name: &StreamName, events: Vec<EventEnvelope>) -> Result<()> {
        debug!(stream = %stream_name, events = events.len(), "append_to");
        observe("append_to", self.inner.append_to(stream_name, events).await)
    }

    async fn load(
        &self,
        stream_name: &StreamName,
        from_no: i64,
        count: Option<u64>,
        matcher: Option<&MetadataMatcher>,
    ) -> Result<Box<dyn EventIterator>> {
        debug!(stream = %stream_name, from_no, ?count, "load");
        observe(
            "load",
            self.inner.load(stream_name, from_no, count, matcher).await,
        )
    }

    async fn load_reverse(
        &self,
        stream_name: &StreamName,
        from_no: Option<i64>,
        count: Option<u64>,
        matcher: Option<&MetadataMatcher>,
    ) -> Result<Box<dyn EventIterator>> {
        debug!(stream = %stream_name, ?from_no, ?count, "load_reverse");
        observe(
            "load_reverse",
            self.inner
                .load_reverse(stream_name, from_no, count, matcher)
                .await,
        )
    }

    async fn delete(&self, stream_name: &StreamName) -> Result<()> {
        debug!(stream = %stream_name, "delete");
        observe("delete", self.inner.delete(stream_name).await)
    }

    async fn has_stream(&self, stream_name: &StreamName) -> Result<bool> {
        observe("has_stream", self.inner.has_stream(stream_name).await)
    }

    async fn fetch_stream_metadata(&self, stream_name: &StreamName) -> Result<Option<JsonMap>> {
        observe(
            "fetch_stream_metadata",
            self.inner.fetch_stream_metadata(stream_name).await,
        )
    }

    async fn update_stream_metadata(
        &self,
        stream_name: &StreamName,
        metadata: JsonMap,
    ) -> Result<()> {
        debug!(stream = %stream_name, "update_stream_metadata");
        observe(
            "update_stream_metadata",
            self.inner.update_stream_metadata(stream_name, metadata).await,
        )
    }

    async fn fetch_stream_names(
        &self,
        filter: Option<&str>,
        limit: Option<u64>,
        offset: u64,
    ) -> Result<Vec<StreamName>> {
        observe(
            "fetch_stream_names",
            self.inner.fetch_stream_names(filter, limit, offset).await,
        )
    }

    async fn fetch_category_names(&self, limit: Option<u64>, offset: u64) -> Result<Vec<String>> {
        observe(
            "fetch_category_names",
            self.inner.fetch_category_names(limit, offset).await,
        )
    }

    async fn begin_transaction(&self) -> Result<()> {
        observe("begin_transaction", self.inner.begin_transaction().await)
    }

    async fn commit(&self) -> Result<()> {
        observe("commit", self.inner.commit().await)
    }

    async fn rollback(&self) -> Result<()> {
        observe("rollback", self.inner.rollback().await)
    }

    async fn in_transaction(&self) -> bool {
        self.inner.in_transaction().await
    }
}
