//! Configuration for the event log and its consumers.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the partitioned event logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Number of partitions per log.
    #[serde(default = "default_partition_count")]
    pub partition_count: u32,

    /// Maximum events returned by a single poll.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// How long a poll waits for new events.
    #[serde(default = "default_poll_timeout", with = "humantime_serde")]
    pub poll_timeout: Duration,
}

fn default_partition_count() -> u32 {
    8
}

fn default_batch_size() -> usize {
    100
}

fn default_poll_timeout() -> Duration {
    Duration::from_millis(50)
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            partition_count: default_partition_count(),
            batch_size: default_batch_size(),
            poll_timeout: default_poll_timeout(),
        }
    }
}

impl LogConfig {
    /// Set the partition count.
    #[must_use]
    pub fn with_partition_count(mut self, count: u32) -> Self {
        self.partition_count = count;
        self
    }

    /// Set the poll batch size.
    #[must_use]
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Set the poll timeout.
    #[must_use]
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }
}
