//! Behavioral tests for the in-memory store.

use serde_json::json;

use crate::envelope::{
    EventEnvelope, JsonMap, Stream, StreamName, AGGREGATE_ID_KEY, AGGREGATE_TYPE_KEY,
    AGGREGATE_VERSION_KEY,
};
use crate::interfaces::event_store::{EventStore, EventStoreError};
use crate::metadata::{MetadataMatcher, Operator};

use super::InMemoryEventStore;

fn name(raw: &str) -> StreamName {
    StreamName::new(raw).expect("valid stream name")
}

fn event(event_name: &str) -> EventEnvelope {
    let mut payload = JsonMap::new();
    payload.insert("id".to_string(), json!(123));
    EventEnvelope::new(event_name, payload)
}

fn aggregate_event(event_name: &str, version: i64) -> EventEnvelope {
    event(event_name)
        .with_metadata_entry(AGGREGATE_TYPE_KEY, "user")
        .with_metadata_entry(AGGREGATE_ID_KEY, "9f2b1a64-58a0-4f3e-9f5c-8c5ad68c2f01")
        .with_metadata_entry(AGGREGATE_VERSION_KEY, version)
}

async fn collect(mut iter: Box<dyn crate::interfaces::event_store::EventIterator>) -> Vec<EventEnvelope> {
    let mut events = Vec::new();
    while let Some(event) = iter.next().await.expect("iterates") {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn create_makes_stream_visible() {
    let store = InMemoryEventStore::new();
    let stream = name("user-123");
    assert!(!store.has_stream(&stream).await.expect("queries"));

    store
        .create(Stream::new(stream.clone()).with_events(vec![event("UserCreated")]))
        .await
        .expect("creates");

    assert!(store.has_stream(&stream).await.expect("queries"));
    let events = collect(store.load(&stream, 0, None, None).await.expect("loads")).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].no, Some(1));
}

#[tokio::test]
async fn create_twice_reports_stream_exists() {
    let store = InMemoryEventStore::new();
    store
        .create(Stream::new(name("user-123")))
        .await
        .expect("creates");
    let result = store.create(Stream::new(name("user-123"))).await;
    assert!(matches!(result, Err(EventStoreError::StreamExists(_))));
}

#[tokio::test]
async fn append_to_missing_stream_fails() {
    let store = InMemoryEventStore::new();
    let result = store
        .append_to(&name("user-123"), vec![event("UserCreated")])
        .await;
    assert!(matches!(result, Err(EventStoreError::StreamNotFound(_))));
}

#[tokio::test]
async fn empty_append_is_a_no_op() {
    let store = InMemoryEventStore::new();
    store
        .append_to(&name("user-123"), Vec::new())
        .await
        .expect("no-op append succeeds without a stream");
}

#[tokio::test]
async fn serial_appends_get_strictly_increasing_positions() {
    let store = InMemoryEventStore::new();
    let stream = name("user-123");
    store
        .create(Stream::new(stream.clone()))
        .await
        .expect("creates");
    store
        .append_to(&stream, vec![event("A"), event("B")])
        .await
        .expect("appends");
    store
        .append_to(&stream, vec![event("C")])
        .await
        .expect("appends");

    let events = collect(store.load(&stream, 0, None, None).await.expect("loads")).await;
    let positions: Vec<i64> = events.iter().filter_map(|e| e.no).collect();
    assert_eq!(positions, vec![1, 2, 3]);
}

#[tokio::test]
async fn loaded_event_round_trips() {
    let store = InMemoryEventStore::new();
    let stream = name("user-123");
    let original = event("UserCreated").with_metadata_entry("role", "admin");
    store
        .create(Stream::new(stream.clone()).with_events(vec![original.clone()]))
        .await
        .expect("creates");

    let events = collect(store.load(&stream, 1, Some(1), None).await.expect("loads")).await;
    assert_eq!(events.len(), 1);
    let loaded = &events[0];
    assert_eq!(loaded.uuid, original.uuid);
    assert_eq!(loaded.event_name, original.event_name);
    assert_eq!(loaded.payload, original.payload);
    assert_eq!(loaded.metadata, original.metadata);
    assert_eq!(loaded.created_at, original.created_at);
}

#[tokio::test]
async fn load_past_the_last_position_is_empty() {
    let store = InMemoryEventStore::new();
    let stream = name("user-123");
    store
        .create(Stream::new(stream.clone()).with_events(vec![event("A")]))
        .await
        .expect("creates");
    let events = collect(store.load(&stream, 2, None, None).await.expect("loads")).await;
    assert!(events.is_empty());
}

#[tokio::test]
async fn load_honors_count_and_from() {
    let store = InMemoryEventStore::new();
    let stream = name("user-123");
    store
        .create(Stream::new(stream.clone()).with_events(vec![
            event("A"),
            event("B"),
            event("C"),
            event("D"),
        ]))
        .await
        .expect("creates");

    let events = collect(
        store
            .load(&stream, 2, Some(2), None)
            .await
            .expect("loads"),
    )
    .await;
    let positions: Vec<i64> = events.iter().filter_map(|e| e.no).collect();
    assert_eq!(positions, vec![2, 3]);
}

#[tokio::test]
async fn load_applies_metadata_matcher() {
    let store = InMemoryEventStore::new();
    let stream = name("user-123");
    store
        .create(
            Stream::new(stream.clone()).with_events(vec![
                event("A").with_metadata_entry("role", "admin"),
                event("B").with_metadata_entry("role", "guest"),
                event("C").with_metadata_entry("role", "admin"),
            ]),
        )
        .await
        .expect("creates");

    let matcher = MetadataMatcher::new()
        .with("role", Operator::Equals, "admin")
        .expect("valid matcher");
    let events = collect(
        store
            .load(&stream, 0, None, Some(&matcher))
            .await
            .expect("loads"),
    )
    .await;
    let names: Vec<&str> = events.iter().map(|e| e.event_name.as_str()).collect();
    assert_eq!(names, vec!["A", "C"]);
}

#[tokio::test]
async fn reverse_load_mirrors_forward_load() {
    let store = InMemoryEventStore::new();
    let stream = name("user-123");
    store
        .create(Stream::new(stream.clone()).with_events(vec![
            event("A"),
            event("B"),
            event("C"),
        ]))
        .await
        .expect("creates");

    let forward = collect(store.load(&stream, 0, None, None).await.expect("loads")).await;
    let mut reversed = collect(
        store
            .load_reverse(&stream, None, None, None)
            .await
            .expect("loads"),
    )
    .await;
    reversed.reverse();
    assert_eq!(forward, reversed);
}

#[tokio::test]
async fn reverse_load_honors_from_and_count() {
    let store = InMemoryEventStore::new();
    let stream = name("user-123");
    store
        .create(Stream::new(stream.clone()).with_events(vec![
            event("A"),
            event("B"),
            event("C"),
            event("D"),
        ]))
        .await
        .expect("creates");

    let events = collect(
        store
            .load_reverse(&stream, Some(3), Some(2), None)
            .await
            .expect("loads"),
    )
    .await;
    let positions: Vec<i64> = events.iter().filter_map(|e| e.no).collect();
    assert_eq!(positions, vec![3, 2]);
}

#[tokio::test]
async fn duplicate_event_id_conflicts_and_leaves_no_rows() {
    let store = InMemoryEventStore::new();
    let stream = name("user-123");
    let first = event("A");
    store
        .create(Stream::new(stream.clone()).with_events(vec![first.clone()]))
        .await
        .expect("creates");

    let result = store
        .append_to(&stream, vec![event("B"), first.clone()])
        .await;
    assert!(matches!(result, Err(EventStoreError::Concurrency(_))));

    let events = collect(store.load(&stream, 0, None, None).await.expect("loads")).await;
    assert_eq!(events.len(), 1, "failed batch must not be partially visible");
}

#[tokio::test]
async fn duplicate_aggregate_version_conflicts() {
    let store = InMemoryEventStore::new();
    let stream = name("user-123");
    store
        .create(Stream::new(stream.clone()).with_events(vec![aggregate_event("A", 1)]))
        .await
        .expect("creates");

    let result = store.append_to(&stream, vec![aggregate_event("B", 1)]).await;
    assert!(matches!(result, Err(EventStoreError::Concurrency(_))));

    store
        .append_to(&stream, vec![aggregate_event("B", 2)])
        .await
        .expect("next version appends");
}

#[tokio::test]
async fn delete_removes_stream_and_is_not_idempotent() {
    let store = InMemoryEventStore::new();
    let stream = name("user-123");
    store
        .create(Stream::new(stream.clone()))
        .await
        .expect("creates");
    store.delete(&stream).await.expect("deletes");
    assert!(!store.has_stream(&stream).await.expect("queries"));
    assert!(matches!(
        store.delete(&stream).await,
        Err(EventStoreError::StreamNotFound(_))
    ));
    assert!(matches!(
        store.load(&stream, 0, None, None).await.err(),
        Some(EventStoreError::StreamNotFound(_))
    ));
}

#[tokio::test]
async fn stream_metadata_round_trips_and_updates() {
    let store = InMemoryEventStore::new();
    let stream = name("user-123");
    let mut metadata = JsonMap::new();
    metadata.insert("owner".to_string(), json!("ops"));
    store
        .create(Stream::new(stream.clone()).with_metadata(metadata.clone()))
        .await
        .expect("creates");

    assert_eq!(
        store
            .fetch_stream_metadata(&stream)
            .await
            .expect("queries"),
        Some(metadata)
    );
    assert_eq!(
        store
            .fetch_stream_metadata(&name("missing-1"))
            .await
            .expect("queries"),
        None
    );

    let mut updated = JsonMap::new();
    updated.insert("owner".to_string(), json!("platform"));
    store
        .update_stream_metadata(&stream, updated.clone())
        .await
        .expect("updates");
    assert_eq!(
        store
            .fetch_stream_metadata(&stream)
            .await
            .expect("queries"),
        Some(updated)
    );
    assert!(matches!(
        store
            .update_stream_metadata(&name("missing-1"), JsonMap::new())
            .await,
        Err(EventStoreError::StreamNotFound(_))
    ));
}

#[tokio::test]
async fn stream_names_are_sorted_filtered_and_paged() {
    let store = InMemoryEventStore::new();
    for raw in ["user-234", "guest-1", "user-123", "$internal-345"] {
        store
            .create(Stream::new(name(raw)))
            .await
            .expect("creates");
    }

    let all: Vec<String> = store
        .fetch_stream_names(None, None, 0)
        .await
        .expect("queries")
        .iter()
        .map(|n| n.as_str().to_string())
        .collect();
    assert_eq!(all, vec!["$internal-345", "guest-1", "user-123", "user-234"]);

    let filtered = store
        .fetch_stream_names(Some("user-123"), None, 0)
        .await
        .expect("queries");
    assert_eq!(filtered.len(), 1);

    let paged: Vec<String> = store
        .fetch_stream_names(None, Some(2), 1)
        .await
        .expect("queries")
        .iter()
        .map(|n| n.as_str().to_string())
        .collect();
    assert_eq!(paged, vec!["guest-1", "user-123"]);

    let categories = store
        .fetch_category_names(None, 0)
        .await
        .expect("queries");
    assert_eq!(categories, vec!["guest", "user"]);
}

#[tokio::test]
async fn rollback_restores_the_pre_transaction_state() {
    let store = InMemoryEventStore::new();
    let stream = name("user-123");
    store
        .create(Stream::new(stream.clone()).with_events(vec![event("A")]))
        .await
        .expect("creates");

    store.begin_transaction().await.expect("begins");
    assert!(store.in_transaction().await);
    store
        .append_to(&stream, vec![event("B")])
        .await
        .expect("appends");
    store.rollback().await.expect("rolls back");

    let events = collect(store.load(&stream, 0, None, None).await.expect("loads")).await;
    assert_eq!(events.len(), 1);
    assert!(!store.in_transaction().await);
}

#[tokio::test]
async fn commit_keeps_writes_made_inside_the_transaction() {
    let store = InMemoryEventStore::new();
    let stream = name("user-123");
    store
        .create(Stream::new(stream.clone()))
        .await
        .expect("creates");

    store.begin_transaction().await.expect("begins");
    store
        .append_to(&stream, vec![event("A")])
        .await
        .expect("appends");
    store.commit().await.expect("commits");

    let events = collect(store.load(&stream, 0, None, None).await.expect("loads")).await;
    assert_eq!(events.len(), 1);
}

#[tokio::test]
async fn transaction_misuse_is_reported() {
    let store = InMemoryEventStore::new();
    assert!(matches!(
        store.commit().await,
        Err(EventStoreError::TransactionNotStarted)
    ));
    assert!(matches!(
        store.rollback().await,
        Err(EventStoreError::TransactionNotStarted)
    ));
    store.begin_transaction().await.expect("begins");
    assert!(matches!(
        store.begin_transaction().await,
        Err(EventStoreError::TransactionAlreadyStarted)
    ));
    store.rollback().await.expect("rolls back");
}
