//! Storage implementations.

use std::sync::Arc;

use tracing::info;

use crate::config::{StorageConfig, StorageType, StrategyKind};
use crate::envelope::StreamName;
use crate::interfaces::event_store::{EventStore, Result};

pub mod instrumented;
pub mod memory;
pub mod schema;
pub mod sql;
pub mod strategy;

pub use instrumented::InstrumentedEventStore;
pub use memory::InMemoryEventStore;
#[cfg(feature = "mysql")]
pub use sql::mysql::MysqlEventStore;
#[cfg(feature = "postgres")]
pub use sql::postgres::PostgresEventStore;
pub use sql::{SqlDialect, SqlEventStore, SqlStreamIterator};
pub use strategy::{
    MysqlAggregateStreamStrategy, MysqlSingleStreamStrategy, PersistenceStrategy,
    PostgresAggregateStreamStrategy, PostgresSingleStreamStrategy,
};

/// Initialize storage based on configuration.
///
/// Connects the pool, selects the layout strategy, makes sure the stream
/// registry exists, and returns the store behind the interface trait.
pub async fn init_storage(config: &StorageConfig) -> Result<Arc<dyn EventStore>> {
    config.store.validate()?;
    match config.storage_type {
        StorageType::Postgres => init_postgres(config).await,
        StorageType::Mysql => init_mysql(config).await,
        StorageType::Memory => {
            info!("storage: in-memory");
            Ok(Arc::new(InMemoryEventStore::new()))
        }
    }
}

#[cfg(feature = "postgres")]
async fn init_postgres(config: &StorageConfig) -> Result<Arc<dyn EventStore>> {
    info!(uri = %config.uri, "storage: postgres");
    let pool = sqlx::PgPool::connect(&config.uri).await?;
    let strategy: Arc<dyn PersistenceStrategy> = match config.strategy {
        StrategyKind::SingleStream => Arc::new(PostgresSingleStreamStrategy),
        StrategyKind::AggregateStream => Arc::new(PostgresAggregateStreamStrategy),
    };
    let store = PostgresEventStore::new(pool, strategy, config.store.clone())?;
    store.init().await?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "postgres"))]
async fn init_postgres(_config: &StorageConfig) -> Result<Arc<dyn EventStore>> {
    Err(crate::interfaces::event_store::EventStoreError::DriverNotAvailable(
        "postgres".to_string(),
    ))
}

#[cfg(feature = "mysql")]
async fn init_mysql(config: &StorageConfig) -> Result<Arc<dyn EventStore>> {
    info!(uri = %config.uri, "storage: mysql");
    let pool = sqlx::MySqlPool::connect(&config.uri).await?;
    let strategy: Arc<dyn PersistenceStrategy> = match config.strategy {
        StrategyKind::SingleStream => Arc::new(MysqlSingleStreamStrategy),
        StrategyKind::AggregateStream => Arc::new(MysqlAggregateStreamStrategy),
    };
    let store = MysqlEventStore::new(pool, strategy, config.store.clone())?;
    store.init().await?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "mysql"))]
async fn init_mysql(_config: &StorageConfig) -> Result<Arc<dyn EventStore>> {
    Err(crate::interfaces::event_store::EventStoreError::DriverNotAvailable(
        "mysql".to_string(),
    ))
}

/// Distinct category prefixes of the given stream names, sorted, with
/// internal streams ignored.
pub(crate) fn category_names(
    names: &[StreamName],
    limit: Option<u64>,
    offset: u64,
) -> Vec<String> {
    let mut categories: Vec<String> = names
        .iter()
        .filter(|name| !name.is_internal())
        .filter_map(|name| name.category().map(str::to_string))
        .collect();
    categories.sort();
    categories.dedup();
    categories
        .into_iter()
        .skip(offset as usize)
        .take(limit.map(|l| l as usize).unwrap_or(usize::MAX))
        .collect()
}
