//! Shared application state for the allezon server

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use allezon_core::{
    Increment, Ingestor, KvBackend, KvRollupTable, MemoryKvBackend, ProfileStore, QueryConfig,
    QueryResolver, RollupAccumulator, RollupConfig, StoreConfig, UserTag,
};
use allezon_log::{EventLog, LogConfig, PartitionedEventLog};

use crate::error::ServerError;

/// Settings for every component behind the HTTP surface.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub rollup: RollupConfig,
    #[serde(default)]
    pub query: QueryConfig,
}

/// Shared application state accessible by all handlers
#[derive(Clone)]
pub struct AppState {
    /// Key-value backend holding profiles and flushed rollups
    pub backend: Arc<dyn KvBackend>,
    pub profiles: ProfileStore,
    pub ingestor: Ingestor,
    /// Tag stream, partitioned by cookie
    pub tags: Arc<dyn EventLog<UserTag>>,
    /// Increment stream, partitioned by rollup key
    pub increments: Arc<dyn EventLog<Increment>>,
    pub accumulator: Arc<RollupAccumulator>,
    pub resolver: QueryResolver,
    pub query_config: QueryConfig,
    pub rollup_config: RollupConfig,
    /// When the server started
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Create state over a fresh in-memory backend and in-process logs
    pub fn new(config: &EngineConfig) -> Result<Self, ServerError> {
        let backend: Arc<dyn KvBackend> = Arc::new(MemoryKvBackend::new(config.store.shards));
        Self::with_backend(backend, config)
    }

    /// Create state over the given backend
    pub fn with_backend(
        backend: Arc<dyn KvBackend>,
        config: &EngineConfig,
    ) -> Result<Self, ServerError> {
        let tags: Arc<dyn EventLog<UserTag>> =
            Arc::new(PartitionedEventLog::from_config(&config.log)?);
        let increments: Arc<dyn EventLog<Increment>> =
            Arc::new(PartitionedEventLog::from_config(&config.log)?);

        let profiles = ProfileStore::new(backend.clone(), &config.store);
        let table = Arc::new(KvRollupTable::new(
            backend.clone(),
            &config.store,
            &config.rollup,
        ));
        let accumulator = Arc::new(RollupAccumulator::new(table, config.rollup.shards));
        let resolver = QueryResolver::new(accumulator.clone(), config.query.clone());

        Ok(Self {
            ingestor: Ingestor::new(profiles.clone(), tags.clone()),
            backend,
            profiles,
            tags,
            increments,
            accumulator,
            resolver,
            query_config: config.query.clone(),
            rollup_config: config.rollup.clone(),
            started_at: Utc::now(),
        })
    }

    /// Returns how long the server has been running
    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}
