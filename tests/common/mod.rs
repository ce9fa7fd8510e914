//! Shared utilities for integration tests.
//!
//! Builds seeded in-memory stores and event batches for the store and
//! projection scenarios.
#![allow(dead_code)]

use std::sync::Arc;

use serde_json::json;

use chronik::{EventEnvelope, EventStore, InMemoryEventStore, JsonMap, Stream, StreamName};

pub fn store() -> Arc<dyn EventStore> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    Arc::new(InMemoryEventStore::new())
}

pub fn name(raw: &str) -> StreamName {
    StreamName::new(raw).expect("valid stream name")
}

pub fn event(event_name: &str) -> EventEnvelope {
    let mut payload = JsonMap::new();
    payload.insert("value".to_string(), json!(1));
    EventEnvelope::new(event_name, payload)
}

pub fn events(event_name: &str, count: usize) -> Vec<EventEnvelope> {
    (0..count).map(|_| event(event_name)).collect()
}

pub async fn seed(store: &Arc<dyn EventStore>, stream: &str, batch: Vec<EventEnvelope>) {
    store
        .create(Stream::new(name(stream)).with_events(batch))
        .await
        .expect("seeds stream");
}

pub async fn collect(mut iter: Box<dyn chronik::EventIterator>) -> Vec<EventEnvelope> {
    let mut out = Vec::new();
    while let Some(event) = iter.next().await.expect("iterates") {
        out.push(event);
    }
    out
}
