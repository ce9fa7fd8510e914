//! Chronik - append-only event store with stream projections.
//!
//! Events are written to named streams in PostgreSQL or MySQL behind a
//! pluggable persistence strategy; projections read those streams back and
//! fold them into caller-defined state.
//!
//! # Example
//!
//! ```ignore
//! use chronik::{init_storage, Config, EventEnvelope, Flow, Query, Stream, StreamName};
//!
//! let config = Config::load()?;
//! let store = init_storage(&config.storage).await?;
//!
//! let name = StreamName::new("user-123")?;
//! store.create(Stream::new(name.clone())).await?;
//! store
//!     .append_to(&name, vec![EventEnvelope::new("UserCreated", payload)])
//!     .await?;
//!
//! let mut query = Query::new(store, || 0u64)
//!     .from_stream(name)
//!     .when_any(|count, _event| {
//!         *count += 1;
//!         Ok(Flow::Continue)
//!     });
//! query.run().await?;
//! ```

pub mod config;
pub mod envelope;
pub mod interfaces;
pub mod metadata;
pub mod projection;
pub mod storage;

// Re-export common types for library usage
pub use config::{Config, StorageConfig, StorageType, StoreConfig, StrategyKind};
pub use envelope::{EventEnvelope, JsonMap, Stream, StreamName};
pub use interfaces::{EventIterator, EventStore, EventStoreError};
pub use metadata::{MetadataMatcher, Operator};
pub use projection::{Flow, Query};
pub use storage::{init_storage, InMemoryEventStore, InstrumentedEventStore, PersistenceStrategy};
#[cfg(feature = "mysql")]
pub use storage::MysqlEventStore;
#[cfg(feature = "postgres")]
pub use storage::PostgresEventStore;
