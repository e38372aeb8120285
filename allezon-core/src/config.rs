//! Configuration for the profile store, rollup accumulator and query resolver.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::profile::PROFILE_CAP;

/// Key-value store settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Namespace holding user profiles.
    #[serde(default = "default_profile_namespace")]
    pub profile_namespace: String,

    /// Namespace holding flushed rollup counters.
    #[serde(default = "default_rollup_namespace")]
    pub rollup_namespace: String,

    /// Read-modify-write attempts per profile update.
    #[serde(default = "default_profile_retries")]
    pub profile_retries: u32,

    /// Maximum events kept per action in a profile.
    #[serde(default = "default_profile_cap")]
    pub profile_cap: usize,

    /// Deadline for a single backend call.
    #[serde(default = "default_op_timeout", with = "humantime_serde")]
    pub op_timeout: Duration,

    /// Lock shards of the in-memory backend.
    #[serde(default = "default_shards")]
    pub shards: usize,
}

fn default_profile_namespace() -> String {
    "user_profile".to_string()
}

fn default_rollup_namespace() -> String {
    "aggregates".to_string()
}

fn default_profile_retries() -> u32 {
    3
}

fn default_profile_cap() -> usize {
    PROFILE_CAP
}

fn default_op_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_shards() -> usize {
    16
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            profile_namespace: default_profile_namespace(),
            rollup_namespace: default_rollup_namespace(),
            profile_retries: default_profile_retries(),
            profile_cap: default_profile_cap(),
            op_timeout: default_op_timeout(),
            shards: default_shards(),
        }
    }
}

/// Rollup accumulator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollupConfig {
    /// Lock shards of the in-memory increment buffer.
    #[serde(default = "default_shards")]
    pub shards: usize,

    /// How often buffered increments are flushed to the rollup table.
    #[serde(default = "default_flush_interval", with = "humantime_serde")]
    pub flush_interval: Duration,

    /// Read-modify-write attempts per flushed counter.
    #[serde(default = "default_flush_retries")]
    pub flush_retries: u32,
}

fn default_flush_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_flush_retries() -> u32 {
    8
}

impl Default for RollupConfig {
    fn default() -> Self {
        Self {
            shards: default_shards(),
            flush_interval: default_flush_interval(),
            flush_retries: default_flush_retries(),
        }
    }
}

impl RollupConfig {
    #[must_use]
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }
}

/// Query limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Largest number of one-minute buckets a single aggregate query may span.
    #[serde(default = "default_max_buckets")]
    pub max_buckets: i64,

    /// Entries returned per profile list when the request sets no limit.
    #[serde(default = "default_profile_limit")]
    pub default_profile_limit: usize,
}

fn default_max_buckets() -> i64 {
    7 * 24 * 60
}

fn default_profile_limit() -> usize {
    PROFILE_CAP
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_buckets: default_max_buckets(),
            default_profile_limit: default_profile_limit(),
        }
    }
}
