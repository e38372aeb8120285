//! Core traits for event log operations.

use std::time::Duration;

use async_trait::async_trait;

/// Offset into a single partition. Offsets are partition-local.
pub type Offset = u64;

/// Index of a partition within a log.
pub type PartitionId = u32;

/// Position to seek to when (re)starting a consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekPosition {
    /// Start from the beginning of every assigned partition.
    Beginning,
    /// Start from the end (new events only).
    End,
    /// Start from the same offset in every assigned partition.
    Offset(Offset),
    /// Return to the last committed position of each partition.
    Committed,
}

/// Which partitions a consumer reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionSet {
    /// Every partition of the log.
    All,
    /// Only the listed partitions.
    Only(Vec<PartitionId>),
}

impl PartitionSet {
    /// A set holding one partition.
    pub fn single(partition: PartitionId) -> Self {
        Self::Only(vec![partition])
    }
}

/// Routes an event to a partition.
///
/// Events with the same key always land in the same partition and are
/// therefore delivered in append order relative to each other.
pub trait Partitionable {
    /// Partition key, or `None` for the default partition.
    fn partition_key(&self) -> Option<&str>;
}

/// A batch of events returned from polling.
///
/// Events keep per-partition order; the offset paired with each event is
/// local to the partition it was read from.
#[derive(Debug)]
pub struct EventBatch<E> {
    /// The events in this batch.
    pub events: Vec<(Offset, E)>,
}

impl<E> EventBatch<E> {
    /// Create a batch from `(offset, event)` pairs.
    pub fn new(events: Vec<(Offset, E)>) -> Self {
        Self { events }
    }

    /// An empty batch.
    pub fn empty() -> Self {
        Self { events: Vec::new() }
    }

    /// Number of events in the batch.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the batch holds no events.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Offset of the first event, if any.
    pub fn first_offset(&self) -> Option<Offset> {
        self.events.first().map(|(offset, _)| *offset)
    }

    /// Offset of the last event, if any.
    pub fn last_offset(&self) -> Option<Offset> {
        self.events.last().map(|(offset, _)| *offset)
    }
}

impl<E> IntoIterator for EventBatch<E> {
    type Item = (Offset, E);
    type IntoIter = std::vec::IntoIter<(Offset, E)>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.into_iter()
    }
}

/// Trait for appending events and creating consumers.
#[async_trait]
pub trait EventLog<E>: Send + Sync {
    /// Append an event, returning its offset within its partition.
    async fn append(&self, event: E) -> crate::Result<Offset>;

    /// Append several events, returning the offset of the last one.
    async fn append_batch(&self, events: Vec<E>) -> crate::Result<Offset>;

    /// Create a consumer for `group` reading the given partitions.
    ///
    /// The consumer starts at the group's committed positions.
    async fn consumer(
        &self,
        group: &str,
        partitions: PartitionSet,
    ) -> crate::Result<Box<dyn EventConsumer<E>>>;

    /// Number of partitions in this log.
    fn partition_count(&self) -> u32;

    /// Total number of events appended across all partitions.
    fn high_water_mark(&self) -> Offset;
}

/// Trait for polling events with offset tracking.
#[async_trait]
pub trait EventConsumer<E>: Send {
    /// Poll for up to `max_count` events, waiting at most `timeout` when
    /// nothing is available.
    async fn poll(&mut self, max_count: usize, timeout: Duration) -> crate::Result<EventBatch<E>>;

    /// Commit the current read position of every assigned partition.
    async fn commit(&mut self) -> crate::Result<()>;

    /// Move the read position.
    async fn seek(&mut self, position: SeekPosition) -> crate::Result<()>;

    /// The partitions this consumer reads.
    fn partitions(&self) -> &[PartitionId];

    /// The consumer group name.
    fn group(&self) -> &str;
}
