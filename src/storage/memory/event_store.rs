//! In-memory event store.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::envelope::{
    EventEnvelope, JsonMap, Stream, StreamName, AGGREGATE_ID_KEY, AGGREGATE_TYPE_KEY,
    AGGREGATE_VERSION_KEY,
};
use crate::interfaces::event_store::{
    EventIterator, EventStore, EventStoreError, Result,
};
use crate::metadata::MetadataMatcher;
use crate::storage::category_names;

#[derive(Clone)]
struct StoredStream {
    metadata: JsonMap,
    events: Vec<EventEnvelope>,
    next_no: i64,
}

impl StoredStream {
    fn new(metadata: JsonMap) -> Self {
        Self {
            metadata,
            events: Vec::new(),
            next_no: 1,
        }
    }

    /// Append a batch, emulating the SQL uniqueness constraints: duplicate
    /// event ids and duplicate aggregate triples conflict. Validation runs
    /// before any mutation so a failing batch leaves no rows behind.
    fn append(&mut self, name: &StreamName, events: Vec<EventEnvelope>) -> Result<()> {
        let mut ids: HashSet<Uuid> = self.events.iter().map(|e| e.uuid).collect();
        let mut triples: HashSet<(String, String, i64)> =
            self.events.iter().filter_map(aggregate_triple).collect();

        for event in &events {
            if !ids.insert(event.uuid) {
                return Err(EventStoreError::Concurrency(format!(
                    "duplicate event id {} in stream {name}",
                    event.uuid
                )));
            }
            if let Some(triple) = aggregate_triple(event) {
                if !triples.insert(triple) {
                    return Err(EventStoreError::Concurrency(format!(
                        "duplicate aggregate version for event {} in stream {name}",
                        event.uuid
                    )));
                }
            }
        }

        for mut event in events {
            event.no = Some(self.next_no);
            self.next_no += 1;
            self.events.push(event);
        }
        Ok(())
    }
}

fn aggregate_triple(event: &EventEnvelope) -> Option<(String, String, i64)> {
    let kind = event.metadata.get(AGGREGATE_TYPE_KEY)?.as_str()?;
    let id = event.metadata.get(AGGREGATE_ID_KEY)?.as_str()?;
    let version = event.metadata.get(AGGREGATE_VERSION_KEY)?.as_i64()?;
    Some((kind.to_string(), id.to_string(), version))
}

/// Event store keeping everything in process memory.
///
/// Transactions take a snapshot of the whole map on `begin_transaction`;
/// `rollback` restores it, `commit` discards it.
#[derive(Default)]
pub struct InMemoryEventStore {
    streams: RwLock<HashMap<String, StoredStream>>,
    snapshot: Mutex<Option<HashMap<String, StoredStream>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Iterator over an owned, already-selected batch of events.
struct InMemoryIterator {
    events: std::collections::VecDeque<EventEnvelope>,
}

#[async_trait]
impl EventIterator for InMemoryIterator {
    async fn next(&mut self) -> Result<Option<EventEnvelope>> {
        Ok(self.events.pop_front())
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn create(&self, stream: Stream) -> Result<()> {
        let Stream {
            name,
            metadata,
            events,
        } = stream;
        let mut streams = self.streams.write().await;
        if streams.contains_key(name.as_str()) {
            return Err(EventStoreError::StreamExists(name));
        }
        let mut stored = StoredStream::new(metadata);
        stored.append(&name, events)?;
        streams.insert(name.as_str().to_string(), stored);
        Ok(())
    }

    async fn append_to(&self, stream_name: &StreamName, events: Vec<EventEnvelope>) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }
        let mut streams = self.streams.write().await;
        let stored = streams
            .get_mut(stream_name.as_str())
            .ok_or_else(|| EventStoreError::StreamNotFound(stream_name.clone()))?;
        stored.append(stream_name, events)
    }

    async fn load(
        &self,
        stream_name: &StreamName,
        from_no: i64,
        count: Option<u64>,
        matcher: Option<&MetadataMatcher>,
    ) -> Result<Box<dyn EventIterator>> {
        let streams = self.streams.read().await;
        let stored = streams
            .get(stream_name.as_str())
            .ok_or_else(|| EventStoreError::StreamNotFound(stream_name.clone()))?;
        let mut selected = Vec::new();
        for event in &stored.events {
            if event.no.unwrap_or(0) < from_no {
                continue;
            }
            if let Some(matcher) = matcher {
                if !matcher.matches(&event.metadata)? {
                    continue;
                }
            }
            selected.push(event.clone());
            if count.is_some_and(|count| selected.len() as u64 == count) {
                break;
            }
        }
        Ok(Box::new(InMemoryIterator {
            events: selected.into(),
        }))
    }

    async fn load_reverse(
        &self,
        stream_name: &StreamName,
        from_no: Option<i64>,
        count: Option<u64>,
        matcher: Option<&MetadataMatcher>,
    ) -> Result<Box<dyn EventIterator>> {
        let from_no = from_no.unwrap_or(i64::MAX);
        let streams = self.streams.read().await;
        let stored = streams
            .get(stream_name.as_str())
            .ok_or_else(|| EventStoreError::StreamNotFound(stream_name.clone()))?;
        let mut selected = Vec::new();
        for event in stored.events.iter().rev() {
            if event.no.unwrap_or(0) > from_no {
                continue;
            }
            if let Some(matcher) = matcher {
                if !matcher.matches(&event.metadata)? {
                    continue;
                }
            }
            selected.push(event.clone());
            if count.is_some_and(|count| selected.len() as u64 == count) {
                break;
            }
        }
        Ok(Box::new(InMemoryIterator {
            events: selected.into(),
        }))
    }

    async fn delete(&self, stream_name: &StreamName) -> Result<()> {
        let mut streams = self.streams.write().await;
        streams
            .remove(stream_name.as_str())
            .map(|_| ())
            .ok_or_else(|| EventStoreError::StreamNotFound(stream_name.clone()))
    }

    async fn has_stream(&self, stream_name: &StreamName) -> Result<bool> {
        Ok(self.streams.read().await.contains_key(stream_name.as_str()))
    }

    async fn fetch_stream_metadata(&self, stream_name: &StreamName) -> Result<Option<JsonMap>> {
        Ok(self
            .streams
            .read()
            .await
            .get(stream_name.as_str())
            .map(|stored| stored.metadata.clone()))
    }

    async fn update_stream_metadata(
        &self,
        stream_name: &StreamName,
        metadata: JsonMap,
    ) -> Result<()> {
        let mut streams = self.streams.write().await;
        let stored = streams
            .get_mut(stream_name.as_str())
            .ok_or_else(|| EventStoreError::StreamNotFound(stream_name.clone()))?;
        stored.metadata = metadata;
        Ok(())
    }

    async fn fetch_stream_names(
        &self,
        filter: Option<&str>,
        limit: Option<u64>,
        offset: u64,
    ) -> Result<Vec<StreamName>> {
        let streams = self.streams.read().await;
        let mut names: Vec<&String> = streams
            .keys()
            .filter(|name| filter.map_or(true, |f| f == name.as_str()))
            .collect();
        names.sort();
        names
            .into_iter()
            .skip(offset as usize)
            .take(limit.map(|l| l as usize).unwrap_or(usize::MAX))
            .map(|name| StreamName::new(name.clone()))
            .collect()
    }

    async fn fetch_category_names(&self, limit: Option<u64>, offset: u64) -> Result<Vec<String>> {
        let names = self.fetch_stream_names(None, None, 0).await?;
        Ok(category_names(&names, limit, offset))
    }

    async fn begin_transaction(&self) -> Result<()> {
        let mut snapshot = self.snapshot.lock().await;
        if snapshot.is_some() {
            return Err(EventStoreError::TransactionAlreadyStarted);
        }
        *snapshot = Some(self.streams.read().await.clone());
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        self.snapshot
            .lock()
            .await
            .take()
            .map(|_| ())
            .ok_or(EventStoreError::TransactionNotStarted)
    }

    async fn rollback(&self) -> Result<()> {
        let restored = self
            .snapshot
            .lock()
            .await
            .take()
            .ok_or(EventStoreError::TransactionNotStarted)?;
        *self.streams.write().await = restored;
        Ok(())
    }

    async fn in_transaction(&self) -> bool {
        self.snapshot.lock().await.is_some()
    }
}
