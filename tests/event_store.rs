//! Store-level scenarios exercised through the trait object.

mod common;

use std::sync::Arc;

use chronik::{
    init_storage, Config, EventStore, EventStoreError, InstrumentedEventStore, StorageType,
    Stream,
};

use common::{collect, event, events, name, seed, store};

#[tokio::test]
async fn forward_and_reverse_loads_are_duals() {
    let store = store();
    seed(&store, "user-123", events("UserCreated", 25)).await;

    let forward = collect(
        store
            .load(&name("user-123"), 0, None, None)
            .await
            .expect("loads"),
    )
    .await;
    let mut reverse = collect(
        store
            .load_reverse(&name("user-123"), None, None, None)
            .await
            .expect("loads"),
    )
    .await;
    reverse.reverse();
    assert_eq!(forward, reverse);
}

#[tokio::test]
async fn instrumented_store_delegates_every_operation() {
    let inner = store();
    let store = InstrumentedEventStore::new(Arc::clone(&inner));

    store
        .create(Stream::new(name("user-123")).with_events(vec![event("UserCreated")]))
        .await
        .expect("creates");
    store
        .append_to(&name("user-123"), vec![event("UsernameChanged")])
        .await
        .expect("appends");

    assert!(store.has_stream(&name("user-123")).await.expect("queries"));
    let loaded = collect(
        store
            .load(&name("user-123"), 0, None, None)
            .await
            .expect("loads"),
    )
    .await;
    assert_eq!(loaded.len(), 2);

    // Failures pass through unchanged.
    assert!(matches!(
        store.delete(&name("missing-1")).await,
        Err(EventStoreError::StreamNotFound(_))
    ));

    // The decorator and the wrapped store observe the same data.
    let direct = collect(
        inner
            .load(&name("user-123"), 0, None, None)
            .await
            .expect("loads"),
    )
    .await;
    assert_eq!(direct.len(), 2);
}

#[tokio::test]
async fn init_storage_builds_the_memory_backend() {
    let mut config = Config::default();
    config.storage.storage_type = StorageType::Memory;
    let store = init_storage(&config.storage).await.expect("initializes");

    store
        .create(Stream::new(name("user-123")))
        .await
        .expect("creates");
    assert!(store.has_stream(&name("user-123")).await.expect("queries"));
}

#[tokio::test]
async fn init_storage_validates_configuration() {
    let mut config = Config::default();
    config.storage.storage_type = StorageType::Memory;
    config.storage.store.event_streams_table = "bad table".to_string();
    assert!(init_storage(&config.storage).await.is_err());
}
