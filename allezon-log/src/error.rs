//! Error types for the event log.

/// Error type for event log operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The log was built with zero partitions.
    #[error("event log must have at least one partition")]
    NoPartitions,

    /// A consumer asked for a partition the log does not have.
    #[error("unknown partition {partition} (log has {count})")]
    UnknownPartition { partition: u32, count: u32 },

    /// The consumer's partition set was empty.
    #[error("consumer group '{0}' was assigned no partitions")]
    EmptyAssignment(String),
}

/// Result type alias for event log operations.
pub type Result<T> = std::result::Result<T, Error>;
