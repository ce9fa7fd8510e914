//! Event persistence interface.

use async_trait::async_trait;

use crate::envelope::{EventEnvelope, JsonMap, Stream, StreamName};
use crate::metadata::MetadataMatcher;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, EventStoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum EventStoreError {
    #[error("stream already exists: {0}")]
    StreamExists(StreamName),

    #[error("stream not found: {0}")]
    StreamNotFound(StreamName),

    #[error("concurrency conflict: {0}")]
    Concurrency(String),

    #[error("transaction already started")]
    TransactionAlreadyStarted,

    #[error("no transaction started")]
    TransactionNotStarted,

    #[error("database driver not available: {0}")]
    DriverNotAvailable(String),

    #[error("invalid stream name: {0}")]
    InvalidStreamName(String),

    #[error("invalid metadata constraint: {0}")]
    InvalidConstraint(String),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Runtime(String),
}

/// Lazy cursor over the events of one stream.
///
/// Backends page rows on demand; exhaustion is signaled by `Ok(None)`.
/// Restart is only possible by opening a new iterator.
#[async_trait]
pub trait EventIterator: Send {
    /// The next event, or `None` once the cursor is exhausted.
    async fn next(&mut self) -> Result<Option<EventEnvelope>>;
}

/// Interface for event persistence.
///
/// Implementations:
/// - `PostgresEventStore` / `MysqlEventStore`: SQL storage behind a
///   persistence strategy
/// - `InMemoryEventStore`: process-local storage for tests and embedding
///
/// All operations are synchronous from the caller's perspective: every
/// error arises from the call that triggered it, and empty result sets are
/// not errors.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Create a stream: registry entry, physical storage, and the initial
    /// event batch, atomically from the caller's point of view.
    async fn create(&self, stream: Stream) -> Result<()>;

    /// Append events to an existing stream as one statement.
    ///
    /// An empty batch is a no-op. Unique-constraint violations surface as
    /// [`EventStoreError::Concurrency`] with no rows from the call visible.
    async fn append_to(&self, stream_name: &StreamName, events: Vec<EventEnvelope>) -> Result<()>;

    /// Open a forward iterator over `stream_name` starting at position
    /// `from_no`, yielding at most `count` events (`None` = unbounded)
    /// that satisfy `matcher`.
    async fn load(
        &self,
        stream_name: &StreamName,
        from_no: i64,
        count: Option<u64>,
        matcher: Option<&MetadataMatcher>,
    ) -> Result<Box<dyn EventIterator>>;

    /// Open a reverse iterator starting at `from_no` (`None` = from the
    /// newest event) and walking toward the oldest.
    async fn load_reverse(
        &self,
        stream_name: &StreamName,
        from_no: Option<i64>,
        count: Option<u64>,
        matcher: Option<&MetadataMatcher>,
    ) -> Result<Box<dyn EventIterator>>;

    /// Remove a stream: registry entry and physical storage.
    async fn delete(&self, stream_name: &StreamName) -> Result<()>;

    /// Whether the stream exists.
    async fn has_stream(&self, stream_name: &StreamName) -> Result<bool>;

    /// The stream's registry metadata, or `None` for an absent stream.
    async fn fetch_stream_metadata(&self, stream_name: &StreamName) -> Result<Option<JsonMap>>;

    /// Replace the stream's registry metadata.
    async fn update_stream_metadata(
        &self,
        stream_name: &StreamName,
        metadata: JsonMap,
    ) -> Result<()>;

    /// List registered stream names, sorted. `filter` restricts to an
    /// exact name.
    async fn fetch_stream_names(
        &self,
        filter: Option<&str>,
        limit: Option<u64>,
        offset: u64,
    ) -> Result<Vec<StreamName>>;

    /// List the distinct categories (`prefix` of `prefix-...` names),
    /// sorted. Internal streams are not considered.
    async fn fetch_category_names(&self, limit: Option<u64>, offset: u64) -> Result<Vec<String>>;

    /// Start a transaction. At most one may be open per store.
    async fn begin_transaction(&self) -> Result<()>;

    /// Commit the open transaction.
    async fn commit(&self) -> Result<()>;

    /// Roll back the open transaction.
    async fn rollback(&self) -> Result<()>;

    /// Whether a transaction is currently open.
    async fn in_transaction(&self) -> bool;
}
