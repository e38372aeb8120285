//! Rollup counters and the durable table they are flushed to.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{RollupConfig, StoreConfig};
use crate::rollup::RollupKey;
use crate::store::{KvBackend, OccStore, Result};

/// Running count and price sum of one rollup cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollupCounter {
    pub count: u64,
    pub sum_price: i64,
}

impl RollupCounter {
    pub fn new(count: u64, sum_price: i64) -> Self {
        Self { count, sum_price }
    }

    /// Count one event of `price`.
    pub fn record(&mut self, price: i64) {
        self.count += 1;
        self.sum_price += price;
    }

    pub fn merge(&mut self, other: RollupCounter) {
        self.count += other.count;
        self.sum_price += other.sum_price;
    }
}

/// Durable storage of rollup counters.
#[async_trait]
pub trait RollupTable: Send + Sync {
    /// Add `delta` to the counter stored under `key`.
    async fn add(&self, key: &RollupKey, delta: RollupCounter) -> Result<()>;

    /// Stored counter, `None` if nothing was ever added.
    async fn get(&self, key: &RollupKey) -> Result<Option<RollupCounter>>;
}

/// Rollup table kept in a key-value namespace, added to with generation checks.
pub struct KvRollupTable {
    store: OccStore<RollupCounter>,
    retries: u32,
}

impl KvRollupTable {
    pub fn new(backend: Arc<dyn KvBackend>, store: &StoreConfig, rollup: &RollupConfig) -> Self {
        Self {
            store: OccStore::new(backend, store.rollup_namespace.clone(), store.op_timeout),
            retries: rollup.flush_retries,
        }
    }
}

#[async_trait]
impl RollupTable for KvRollupTable {
    async fn add(&self, key: &RollupKey, delta: RollupCounter) -> Result<()> {
        self.store
            .rmw(key.as_str(), self.retries, &RollupCounter::default(), |counter| {
                counter.merge(delta)
            })
            .await?;
        Ok(())
    }

    async fn get(&self, key: &RollupKey) -> Result<Option<RollupCounter>> {
        match self.store.get(key.as_str()).await {
            Ok(counter) => Ok(Some(counter)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}
