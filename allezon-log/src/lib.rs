//! Partitioned event log for allezon.
//!
//! This crate provides the stream abstraction the ingest pipeline is built
//! on. It implements a producer/consumer model with independent,
//! per-partition offset tracking per consumer group.
//!
//! # Key Types
//!
//! - [`EventLog`] - Trait for appending events and creating consumers
//! - [`EventConsumer`] - Trait for polling events with offset tracking
//! - [`Partitionable`] - Routes an event to a partition by key
//! - [`PartitionedEventLog`] - In-process implementation of EventLog

pub mod config;
pub mod error;
pub mod memory;
pub mod traits;

// Re-exports
pub use config::LogConfig;
pub use error::{Error, Result};
pub use memory::PartitionedEventLog;
pub use traits::{
    EventBatch, EventConsumer, EventLog, Offset, PartitionId, PartitionSet, Partitionable,
    SeekPosition,
};
