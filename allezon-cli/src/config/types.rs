use allezon_core::{QueryConfig, RollupConfig, StoreConfig};
use allezon_log::LogConfig;
use allezon_server::{EngineConfig, ServerConfig};
use serde::{Deserialize, Serialize};

/// Effective configuration after all layers are merged
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AllezonConfig {
    #[serde(default)]
    pub server: ServerConfig,

    /// Tag and increment streams
    #[serde(default)]
    pub log: LogConfig,

    /// Profile and rollup storage
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub rollup: RollupConfig,

    #[serde(default)]
    pub query: QueryConfig,
}

impl AllezonConfig {
    /// Settings for everything behind the HTTP surface
    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            log: self.log.clone(),
            store: self.store.clone(),
            rollup: self.rollup.clone(),
            query: self.query.clone(),
        }
    }

    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
