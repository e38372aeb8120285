//! In-process partitioned EventLog.
//!
//! Events are routed to partitions by hashing their partition key, each
//! partition keeps its own offset sequence and its own lock, and consumer
//! groups track a committed offset per partition. A consumer may be
//! assigned a subset of partitions so that every partition is read by
//! exactly one task of a group.
//!
//! A consumer group registers an interest in a partition when its first
//! consumer is created. Events every registered group has committed past
//! are released; offsets keep counting from where they were, so a released
//! prefix only moves the partition's base offset.

use std::collections::{HashMap, VecDeque};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, RwLock};
use tracing::trace;

use crate::config::LogConfig;
use crate::error::{Error, Result};
use crate::traits::{
    EventBatch, EventConsumer, EventLog, Offset, PartitionId, PartitionSet, Partitionable,
    SeekPosition,
};

/// Retained events of one partition.
struct Partition<E> {
    /// Offset of the first retained event.
    base: Offset,
    events: VecDeque<E>,
}

impl<E> Partition<E> {
    fn new() -> Self {
        Self {
            base: 0,
            events: VecDeque::new(),
        }
    }

    /// Offset the next appended event gets.
    fn end(&self) -> Offset {
        self.base + self.events.len() as Offset
    }

    /// Drop events below `floor`, returning how many were dropped.
    fn release_below(&mut self, floor: Offset) -> usize {
        let count = floor.saturating_sub(self.base).min(self.events.len() as Offset) as usize;
        self.events.drain(..count);
        self.base += count as Offset;
        count
    }
}

/// Shared state between the log and its consumers.
struct SharedState<E> {
    partitions: Vec<RwLock<Partition<E>>>,
    committed: RwLock<HashMap<String, HashMap<PartitionId, Offset>>>,
    /// Events appended across all partitions.
    appended: AtomicU64,
    notify: Notify,
}

/// Partitioned in-memory implementation of EventLog.
pub struct PartitionedEventLog<E> {
    shared: Arc<SharedState<E>>,
}

impl<E> PartitionedEventLog<E>
where
    E: Clone + Send + Sync + Partitionable + 'static,
{
    /// Create a log with `partition_count` partitions.
    pub fn new(partition_count: u32) -> Result<Self> {
        if partition_count == 0 {
            return Err(Error::NoPartitions);
        }

        Ok(Self {
            shared: Arc::new(SharedState {
                partitions: (0..partition_count).map(|_| RwLock::new(Partition::new())).collect(),
                committed: RwLock::new(HashMap::new()),
                appended: AtomicU64::new(0),
                notify: Notify::new(),
            }),
        })
    }

    /// Create a log sized by `config`.
    pub fn from_config(config: &LogConfig) -> Result<Self> {
        Self::new(config.partition_count)
    }

    /// Partition a key routes to.
    pub fn partition_for_key(&self, key: Option<&str>) -> PartitionId {
        match key {
            Some(k) => {
                let mut hasher = DefaultHasher::new();
                k.hash(&mut hasher);
                (hasher.finish() % self.shared.partitions.len() as u64) as PartitionId
            }
            None => 0,
        }
    }

    /// Number of events currently retained in one partition.
    pub async fn partition_len(&self, partition: PartitionId) -> usize {
        match self.shared.partitions.get(partition as usize) {
            Some(p) => p.read().await.events.len(),
            None => 0,
        }
    }

    /// Number of events retained across all partitions.
    pub async fn total_count(&self) -> usize {
        let mut total = 0;
        for partition in &self.shared.partitions {
            total += partition.read().await.events.len();
        }
        total
    }

    fn resolve(&self, group: &str, partitions: PartitionSet) -> Result<Vec<PartitionId>> {
        let count = self.shared.partitions.len() as u32;
        let ids = match partitions {
            PartitionSet::All => (0..count).collect(),
            PartitionSet::Only(ids) => ids,
        };

        if ids.is_empty() {
            return Err(Error::EmptyAssignment(group.to_string()));
        }
        if let Some(&partition) = ids.iter().find(|&&id| id >= count) {
            return Err(Error::UnknownPartition { partition, count });
        }
        Ok(ids)
    }
}

#[async_trait]
impl<E> EventLog<E> for PartitionedEventLog<E>
where
    E: Clone + Send + Sync + Partitionable + 'static,
{
    async fn append(&self, event: E) -> Result<Offset> {
        let partition_id = self.partition_for_key(event.partition_key());
        let offset = {
            let mut partition = self.shared.partitions[partition_id as usize].write().await;
            partition.events.push_back(event);
            partition.end() - 1
        };

        self.shared.appended.fetch_add(1, Ordering::Relaxed);
        self.shared.notify.notify_waiters();
        trace!(partition = partition_id, offset, "Appended event");
        Ok(offset)
    }

    async fn append_batch(&self, events: Vec<E>) -> Result<Offset> {
        let mut last_offset = 0;
        for event in events {
            last_offset = self.append(event).await?;
        }
        Ok(last_offset)
    }

    async fn consumer(
        &self,
        group: &str,
        partitions: PartitionSet,
    ) -> Result<Box<dyn EventConsumer<E>>> {
        let partitions = self.resolve(group, partitions)?;
        let positions = register_group(&self.shared, group, &partitions).await;

        Ok(Box::new(PartitionedConsumer {
            group: group.to_string(),
            shared: Arc::clone(&self.shared),
            partitions,
            positions,
        }))
    }

    fn partition_count(&self) -> u32 {
        self.shared.partitions.len() as u32
    }

    fn high_water_mark(&self) -> Offset {
        self.shared.appended.load(Ordering::Relaxed)
    }
}

/// Record `group` as a reader of `partitions`, starting unknown partitions
/// at their base, and return the group's committed positions.
async fn register_group<E>(
    shared: &SharedState<E>,
    group: &str,
    partitions: &[PartitionId],
) -> Vec<Offset> {
    let mut committed = shared.committed.write().await;
    let offsets = committed.entry(group.to_string()).or_default();
    let mut positions = Vec::with_capacity(partitions.len());
    for partition in partitions {
        let position = match offsets.get(partition) {
            Some(offset) => *offset,
            None => {
                let base = shared.partitions[*partition as usize].read().await.base;
                offsets.insert(*partition, base);
                base
            }
        };
        positions.push(position);
    }
    positions
}

async fn committed_positions<E>(
    shared: &SharedState<E>,
    group: &str,
    partitions: &[PartitionId],
) -> Vec<Offset> {
    let committed = shared.committed.read().await;
    let group_offsets = committed.get(group);
    let mut positions = Vec::with_capacity(partitions.len());
    for partition in partitions {
        let position = match group_offsets.and_then(|offsets| offsets.get(partition)) {
            Some(offset) => *offset,
            None => shared.partitions[*partition as usize].read().await.base,
        };
        positions.push(position);
    }
    positions
}

/// Consumer reading an assigned set of partitions.
struct PartitionedConsumer<E> {
    group: String,
    shared: Arc<SharedState<E>>,
    partitions: Vec<PartitionId>,
    /// Next offset to read, parallel to `partitions`.
    positions: Vec<Offset>,
}

impl<E: Clone> PartitionedConsumer<E> {
    async fn read_available(&mut self, max_count: usize) -> EventBatch<E> {
        let per_partition = (max_count / self.partitions.len()).max(1);
        let mut events = Vec::new();

        for (slot, partition_id) in self.partitions.iter().enumerate() {
            if events.len() >= max_count {
                break;
            }
            let partition = self.shared.partitions[*partition_id as usize].read().await;
            let start = self.positions[slot].max(partition.base);
            let take = per_partition.min(max_count - events.len()) as Offset;
            let end = partition.end().min(start + take);

            if end > start {
                let first = (start - partition.base) as usize;
                let last = (end - partition.base) as usize;
                for (offset, event) in (start..).zip(partition.events.range(first..last)) {
                    events.push((offset, event.clone()));
                }
                self.positions[slot] = end;
            }
        }

        EventBatch::new(events)
    }
}

#[async_trait]
impl<E> EventConsumer<E> for PartitionedConsumer<E>
where
    E: Clone + Send + Sync + 'static,
{
    async fn poll(&mut self, max_count: usize, timeout: Duration) -> Result<EventBatch<E>> {
        // Register for wakeups before looking so an append between the
        // check and the wait is not missed.
        let shared = Arc::clone(&self.shared);
        let notified = shared.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        let batch = self.read_available(max_count).await;
        if !batch.is_empty() || timeout.is_zero() {
            return Ok(batch);
        }

        let _ = tokio::time::timeout(timeout, notified).await;
        Ok(self.read_available(max_count).await)
    }

    async fn commit(&mut self) -> Result<()> {
        let mut committed = self.shared.committed.write().await;
        let offsets = committed.entry(self.group.clone()).or_default();
        for (partition, position) in self.partitions.iter().zip(&self.positions) {
            offsets.insert(*partition, *position);
        }

        for partition_id in &self.partitions {
            let floor = committed
                .values()
                .filter_map(|offsets| offsets.get(partition_id))
                .min()
                .copied();
            let Some(floor) = floor else { continue };

            let mut partition = self.shared.partitions[*partition_id as usize].write().await;
            let released = partition.release_below(floor);
            if released > 0 {
                trace!(
                    partition = partition_id,
                    released,
                    base = partition.base,
                    "Released committed events"
                );
            }
        }
        Ok(())
    }

    async fn seek(&mut self, position: SeekPosition) -> Result<()> {
        match position {
            SeekPosition::Beginning => {
                for (slot, partition_id) in self.partitions.iter().enumerate() {
                    self.positions[slot] =
                        self.shared.partitions[*partition_id as usize].read().await.base;
                }
            }
            SeekPosition::End => {
                for (slot, partition_id) in self.partitions.iter().enumerate() {
                    self.positions[slot] =
                        self.shared.partitions[*partition_id as usize].read().await.end();
                }
            }
            SeekPosition::Offset(offset) => {
                self.positions.iter_mut().for_each(|p| *p = offset);
            }
            SeekPosition::Committed => {
                self.positions =
                    committed_positions(&self.shared, &self.group, &self.partitions).await;
            }
        }
        Ok(())
    }

    fn partitions(&self) -> &[PartitionId] {
        &self.partitions
    }

    fn group(&self) -> &str {
        &self.group
    }
}
