//! Consumer infrastructure for EventLog-based stream processing.
//!
//! This module provides the `ConsumerManager` which spawns and manages consumer
//! tasks reading a partitioned EventLog. Every partition is read by exactly one
//! task of a group, so events sharing a partition key are handled in order.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                   tag stream (by cookie)                   │
//! │   [p0: t0 t3 ...]   [p1: t1 t4 ...]   [p2: t2 t5 ...]      │
//! └──────┬───────────────────┬───────────────────┬────────────┘
//!        ▼                   ▼                   ▼
//!   forwarder/p0        forwarder/p1        forwarder/p2
//!        └───────────────────┼───────────────────┘
//!                            ▼
//! ┌───────────────────────────────────────────────────────────┐
//! │                increment stream (by rollup key)            │
//! └──────┬───────────────────┬───────────────────┬────────────┘
//!        ▼                   ▼                   ▼
//!   collector/p0        collector/p1        collector/p2
//! ```
//!
//! A handler failure rewinds the consumer to its last committed position,
//! so the failed batch is delivered again (at-least-once).

pub mod pipeline;

use std::error::Error as StdError;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use allezon_log::{EventConsumer, EventLog, LogConfig, PartitionSet, SeekPosition};

/// Result type for consumer operations.
pub type Result<T> = std::result::Result<T, ConsumerError>;

/// Errors that can occur in consumer operations.
#[derive(Debug, thiserror::Error)]
pub enum ConsumerError {
    #[error("Failed to create consumer: {0}")]
    Creation(String),

    #[error("Consumer seek failed: {0}")]
    Seek(String),
}

/// Error returned by a handler to request redelivery.
pub type HandlerError = Box<dyn StdError + Send + Sync>;

/// Type alias for async event handlers.
pub type EventHandler<E> = Arc<
    dyn Fn(E) -> Pin<Box<dyn Future<Output = std::result::Result<(), HandlerError>> + Send>>
        + Send
        + Sync,
>;

/// Configuration for a consumer.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Consumer group name (determines offset tracking).
    pub group: String,
    /// Where to start reading from.
    pub start_position: SeekPosition,
    /// Maximum events per poll.
    pub batch_size: usize,
    /// Poll timeout.
    pub poll_timeout: Duration,
    /// Pause after a failed poll or handler before trying again.
    pub retry_backoff: Duration,
}

impl ConsumerConfig {
    /// Resume from the group's committed position.
    pub fn committed(group: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            start_position: SeekPosition::Committed,
            batch_size: 100,
            poll_timeout: Duration::from_millis(50),
            retry_backoff: Duration::from_millis(500),
        }
    }

    /// Create a live consumer that only receives new events.
    pub fn live(group: impl Into<String>) -> Self {
        Self {
            start_position: SeekPosition::End,
            ..Self::committed(group)
        }
    }

    /// Take batch size and poll timeout from the log configuration.
    #[must_use]
    pub fn with_log_config(mut self, config: &LogConfig) -> Self {
        self.batch_size = config.batch_size;
        self.poll_timeout = config.poll_timeout;
        self
    }

    /// Set the retry backoff.
    #[must_use]
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }
}

/// Manages consumer tasks that process events from one EventLog.
pub struct ConsumerManager<E> {
    event_log: Arc<dyn EventLog<E>>,
    handles: Vec<JoinHandle<()>>,
    shutdown: CancellationToken,
}

impl<E> ConsumerManager<E>
where
    E: Send + 'static,
{
    /// Create a new consumer manager.
    pub fn new(event_log: Arc<dyn EventLog<E>>) -> Self {
        Self::with_token(event_log, CancellationToken::new())
    }

    /// Create a manager whose tasks stop when `shutdown` is cancelled.
    pub fn with_token(event_log: Arc<dyn EventLog<E>>, shutdown: CancellationToken) -> Self {
        Self {
            event_log,
            handles: Vec::new(),
            shutdown,
        }
    }

    /// Spawn one consumer task per partition of the log, all in the same group.
    pub async fn spawn_per_partition(
        &mut self,
        config: ConsumerConfig,
        handler: EventHandler<E>,
    ) -> Result<()> {
        for partition in 0..self.event_log.partition_count() {
            self.spawn_consumer(config.clone(), PartitionSet::single(partition), handler.clone())
                .await?;
        }
        Ok(())
    }

    /// Spawn a consumer task reading `partitions` with the given handler.
    ///
    /// The consumer runs until shutdown is signalled. A batch already being
    /// handled is finished and committed before the task exits.
    pub async fn spawn_consumer(
        &mut self,
        config: ConsumerConfig,
        partitions: PartitionSet,
        handler: EventHandler<E>,
    ) -> Result<()> {
        let mut consumer = self
            .event_log
            .consumer(&config.group, partitions)
            .await
            .map_err(|e| ConsumerError::Creation(e.to_string()))?;

        consumer
            .seek(config.start_position)
            .await
            .map_err(|e| ConsumerError::Seek(e.to_string()))?;

        let shutdown = self.shutdown.clone();
        let handle = tokio::spawn(run_consumer(consumer, config, handler, shutdown));

        self.handles.push(handle);
        Ok(())
    }

    /// Signal all consumers to shut down gracefully.
    pub fn shutdown(&self) {
        info!("Signaling consumer shutdown");
        self.shutdown.cancel();
    }

    /// Wait for all consumer tasks to complete.
    pub async fn wait_for_shutdown(self) {
        info!(count = self.handles.len(), "Waiting for consumers to stop");
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Consumer task panicked");
            }
        }
        info!("All consumers stopped");
    }

    /// Get the number of active consumers.
    pub fn consumer_count(&self) -> usize {
        self.handles.len()
    }
}

async fn run_consumer<E>(
    mut consumer: Box<dyn EventConsumer<E>>,
    config: ConsumerConfig,
    handler: EventHandler<E>,
    shutdown: CancellationToken,
) where
    E: Send + 'static,
{
    let group = config.group.clone();
    let partitions = consumer.partitions().to_vec();
    info!(group = %group, ?partitions, "Consumer started");

    loop {
        let result = tokio::select! {
            _ = shutdown.cancelled() => {
                info!(group = %group, "Consumer received shutdown signal");
                break;
            }
            result = consumer.poll(config.batch_size, config.poll_timeout) => result,
        };

        match result {
            Ok(batch) if batch.is_empty() => {
                trace!(group = %group, "Empty batch, continuing");
                continue;
            }
            Ok(batch) => {
                debug!(group = %group, count = batch.len(), "Processing batch");

                let mut failure = None;
                for (offset, event) in batch {
                    if let Err(e) = handler(event).await {
                        failure = Some((offset, e));
                        break;
                    }
                }

                let Some((offset, e)) = failure else {
                    // Commit after processing batch
                    if let Err(e) = consumer.commit().await {
                        error!(group = %group, error = %e, "Failed to commit offset");
                    }
                    continue;
                };

                error!(
                    group = %group,
                    offset,
                    error = %e,
                    "Handler failed, rewinding to committed position"
                );
                if let Err(e) = consumer.seek(SeekPosition::Committed).await {
                    error!(group = %group, error = %e, "Failed to rewind consumer");
                }
            }
            Err(e) => {
                error!(group = %group, error = %e, "Poll failed");
            }
        }

        // Back off on error
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(config.retry_backoff) => {}
        }
    }

    info!(group = %group, "Consumer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use allezon_log::{Partitionable, PartitionedEventLog};

    #[derive(Debug, Clone)]
    struct Ping {
        key: String,
    }

    impl Partitionable for Ping {
        fn partition_key(&self) -> Option<&str> {
            Some(&self.key)
        }
    }

    fn ping(key: &str) -> Ping {
        Ping {
            key: key.to_string(),
        }
    }

    fn counting_handler(processed: Arc<AtomicUsize>) -> EventHandler<Ping> {
        Arc::new(move |_event| {
            let processed = processed.clone();
            Box::pin(async move {
                processed.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        })
    }

    async fn wait_for(counter: &AtomicUsize, expected: usize) {
        for _ in 0..200 {
            if counter.load(Ordering::SeqCst) >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_consumer_manager_spawns_task_per_partition() {
        let log = Arc::new(PartitionedEventLog::<Ping>::new(3).unwrap());
        let mut manager = ConsumerManager::new(log.clone());

        for key in ["a", "b", "c", "d", "e"] {
            log.append(ping(key)).await.unwrap();
        }

        let processed = Arc::new(AtomicUsize::new(0));
        manager
            .spawn_per_partition(
                ConsumerConfig::committed("test-group"),
                counting_handler(processed.clone()),
            )
            .await
            .unwrap();

        wait_for(&processed, 5).await;
        assert_eq!(processed.load(Ordering::SeqCst), 5);
        assert_eq!(manager.consumer_count(), 3);

        manager.shutdown();
        manager.wait_for_shutdown().await;
    }

    #[tokio::test]
    async fn test_consumer_manager_shutdown_graceful() {
        let log = Arc::new(PartitionedEventLog::<Ping>::new(1).unwrap());
        let mut manager = ConsumerManager::new(log.clone());

        let handler: EventHandler<Ping> = Arc::new(|_event| Box::pin(async { Ok(()) }));

        manager
            .spawn_consumer(ConsumerConfig::live("test-group"), PartitionSet::All, handler)
            .await
            .unwrap();

        manager.shutdown();
        manager.wait_for_shutdown().await;
    }

    #[tokio::test]
    async fn test_committed_consumer_resumes_after_restart() {
        let log = Arc::new(PartitionedEventLog::<Ping>::new(1).unwrap());
        log.append(ping("a")).await.unwrap();

        let first = Arc::new(AtomicUsize::new(0));
        let mut manager = ConsumerManager::new(log.clone());
        manager
            .spawn_consumer(
                ConsumerConfig::committed("resume"),
                PartitionSet::All,
                counting_handler(first.clone()),
            )
            .await
            .unwrap();
        wait_for(&first, 1).await;
        manager.shutdown();
        manager.wait_for_shutdown().await;

        log.append(ping("a")).await.unwrap();

        let second = Arc::new(AtomicUsize::new(0));
        let mut manager = ConsumerManager::new(log.clone());
        manager
            .spawn_consumer(
                ConsumerConfig::committed("resume"),
                PartitionSet::All,
                counting_handler(second.clone()),
            )
            .await
            .unwrap();
        wait_for(&second, 1).await;
        manager.shutdown();
        manager.wait_for_shutdown().await;

        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_handler_gets_redelivery() {
        let log = Arc::new(PartitionedEventLog::<Ping>::new(1).unwrap());
        log.append(ping("a")).await.unwrap();

        let attempts = Arc::new(AtomicUsize::new(0));
        let handler: EventHandler<Ping> = {
            let attempts = attempts.clone();
            Arc::new(move |_event| {
                let attempts = attempts.clone();
                Box::pin(async move {
                    if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                        return Err("transient".into());
                    }
                    Ok(())
                })
            })
        };

        let mut manager = ConsumerManager::new(log.clone());
        manager
            .spawn_consumer(
                ConsumerConfig::committed("retry").with_retry_backoff(Duration::from_millis(5)),
                PartitionSet::All,
                handler,
            )
            .await
            .unwrap();

        wait_for(&attempts, 2).await;
        manager.shutdown();
        manager.wait_for_shutdown().await;

        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_consumer_config_live() {
        let config = ConsumerConfig::live("my-group");
        assert_eq!(config.group, "my-group");
        assert_eq!(config.start_position, SeekPosition::End);
    }

    #[tokio::test]
    async fn test_consumer_config_from_log_config() {
        let log_config = LogConfig::default()
            .with_batch_size(7)
            .with_poll_timeout(Duration::from_millis(3));
        let config = ConsumerConfig::committed("g").with_log_config(&log_config);
        assert_eq!(config.batch_size, 7);
        assert_eq!(config.poll_timeout, Duration::from_millis(3));
        assert_eq!(config.start_position, SeekPosition::Committed);
    }
}
