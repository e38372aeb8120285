//! In-memory key-value backend with per-shard locks.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::backend::{Generation, KvBackend, Versioned};
use super::error::{Result, StoreError};

type Shard = HashMap<(String, String), Versioned>;

/// Sharded in-memory backend.
///
/// Each `(namespace, key)` hashes to one shard; writers to different
/// shards never contend.
pub struct MemoryKvBackend {
    shards: Vec<RwLock<Shard>>,
}

impl MemoryKvBackend {
    pub fn new(shards: usize) -> Self {
        let shards = (0..shards.max(1)).map(|_| RwLock::new(HashMap::new())).collect();
        Self { shards }
    }

    fn shard(&self, namespace: &str, key: &str) -> &RwLock<Shard> {
        let mut hasher = DefaultHasher::new();
        namespace.hash(&mut hasher);
        key.hash(&mut hasher);
        let index = (hasher.finish() % self.shards.len() as u64) as usize;
        &self.shards[index]
    }

    /// Number of stored keys across all namespaces.
    pub async fn len(&self) -> usize {
        let mut total = 0;
        for shard in &self.shards {
            total += shard.read().await.len();
        }
        total
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for MemoryKvBackend {
    fn default() -> Self {
        Self::new(16)
    }
}

fn next_generation(current: Generation) -> Generation {
    match current.wrapping_add(1) {
        0 => 1,
        next => next,
    }
}

#[async_trait]
impl KvBackend for MemoryKvBackend {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Versioned>> {
        let shard = self.shard(namespace, key).read().await;
        Ok(shard
            .get(&(namespace.to_string(), key.to_string()))
            .cloned())
    }

    async fn put(
        &self,
        namespace: &str,
        key: &str,
        value: Vec<u8>,
        expected: Generation,
    ) -> Result<Generation> {
        let mut shard = self.shard(namespace, key).write().await;
        let slot = (namespace.to_string(), key.to_string());
        let current = shard.get(&slot).map(|stored| stored.generation).unwrap_or(0);

        if current != expected {
            return Err(StoreError::GenerationMismatch {
                key: key.to_string(),
                expected,
            });
        }

        let generation = next_generation(current);
        shard.insert(slot, Versioned { value, generation });
        Ok(generation)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
