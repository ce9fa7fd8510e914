//! Store configuration.
//!
//! Supports YAML file and environment variable overrides.

use serde::Deserialize;

use crate::interfaces::event_store::{EventStoreError, Result};

/// Storage backend discriminator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    #[default]
    Postgres,
    Mysql,
    Memory,
}

/// Table-layout policy discriminator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// One physical table per logical stream; any number of aggregates.
    #[default]
    SingleStream,
    /// One aggregate instance per stream; positions follow the aggregate
    /// version.
    AggregateStream,
}

/// Tuning knobs shared by every SQL backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Rows fetched per SELECT page while iterating a stream.
    pub load_batch_size: u64,
    /// Name of the stream registry table.
    pub event_streams_table: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            load_batch_size: 10_000,
            event_streams_table: "event_streams".to_string(),
        }
    }
}

impl StoreConfig {
    /// Reject configurations that could not work: a zero page size or a
    /// registry table name outside `[A-Za-z0-9_]`.
    pub fn validate(&self) -> Result<()> {
        if self.load_batch_size == 0 {
            return Err(EventStoreError::Runtime(
                "load_batch_size must be positive".to_string(),
            ));
        }
        validate_identifier(&self.event_streams_table)
    }
}

/// Storage configuration (backend + layout + tuning).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage backend discriminator.
    #[serde(rename = "type")]
    pub storage_type: StorageType,
    /// Database connection URI. Ignored by the in-memory backend.
    pub uri: String,
    /// Table-layout policy.
    pub strategy: StrategyKind,
    /// SQL tuning knobs.
    pub store: StoreConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_type: StorageType::Postgres,
            uri: "postgres://localhost:5432/chronik".to_string(),
            strategy: StrategyKind::SingleStream,
            store: StoreConfig::default(),
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Sources (later overrides earlier):
    /// 1. `config.yaml` in the current directory (if present)
    /// 2. File named by the `CHRONIK_CONFIG` environment variable (if set)
    /// 3. Environment variables with `CHRONIK_` prefix
    pub fn load() -> std::result::Result<Self, Box<dyn std::error::Error>> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new("config", FileFormat::Yaml).required(false))
            .add_source(File::new("config.yaml", FileFormat::Yaml).required(false));

        if let Ok(config_path) = std::env::var("CHRONIK_CONFIG") {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix("CHRONIK")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        Ok(config)
    }
}

/// Validate a SQL identifier against `^[A-Za-z0-9_]+$`.
pub(crate) fn validate_identifier(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(EventStoreError::Runtime(format!(
            "invalid SQL identifier: {name:?}"
        )))
    }
}
