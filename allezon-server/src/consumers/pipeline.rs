//! Stream pipeline: forwarder and collector consumers plus the periodic flusher.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use allezon_core::{Forwarder, Increment, RollupAccumulator, UserTag};
use allezon_log::LogConfig;

use super::{ConsumerConfig, ConsumerManager, EventHandler, HandlerError, Result};
use crate::state::AppState;

/// Consumer group reading tags and publishing increments.
pub const FORWARDER_GROUP: &str = "forwarder";

/// Consumer group applying increments to the accumulator.
pub const COLLECTOR_GROUP: &str = "collector";

/// Running stream processing for one [`AppState`].
pub struct Pipeline {
    forwarders: ConsumerManager<UserTag>,
    collectors: ConsumerManager<Increment>,
    flusher: JoinHandle<()>,
    accumulator: Arc<RollupAccumulator>,
    shutdown: CancellationToken,
}

impl Pipeline {
    /// Spawn one forwarder per tag partition, one collector per increment
    /// partition and the flusher.
    pub async fn start(state: &AppState, log_config: &LogConfig) -> Result<Self> {
        let shutdown = CancellationToken::new();

        let mut forwarders =
            ConsumerManager::with_token(state.tags.clone(), shutdown.child_token());
        forwarders
            .spawn_per_partition(
                ConsumerConfig::committed(FORWARDER_GROUP).with_log_config(log_config),
                forward_handler(Forwarder::new(state.increments.clone())),
            )
            .await?;

        let mut collectors =
            ConsumerManager::with_token(state.increments.clone(), shutdown.child_token());
        collectors
            .spawn_per_partition(
                ConsumerConfig::committed(COLLECTOR_GROUP).with_log_config(log_config),
                collect_handler(state.accumulator.clone()),
            )
            .await?;

        let flusher = spawn_flusher(
            state.accumulator.clone(),
            state.rollup_config.flush_interval,
            shutdown.child_token(),
        );

        info!(
            forwarders = forwarders.consumer_count(),
            collectors = collectors.consumer_count(),
            "Pipeline started"
        );

        Ok(Self {
            forwarders,
            collectors,
            flusher,
            accumulator: state.accumulator.clone(),
            shutdown,
        })
    }

    /// Stop consuming, wait for in-flight batches and flush what is buffered.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        self.forwarders.wait_for_shutdown().await;
        self.collectors.wait_for_shutdown().await;
        if let Err(e) = self.flusher.await {
            error!(error = %e, "Flusher task panicked");
        }

        match self.accumulator.flush().await {
            Ok(keys) => info!(keys, "Final rollup flush complete"),
            Err(e) => error!(error = %e, "Final rollup flush failed"),
        }
    }
}

fn forward_handler(forwarder: Forwarder) -> EventHandler<UserTag> {
    Arc::new(move |tag| {
        let forwarder = forwarder.clone();
        Box::pin(async move {
            forwarder
                .forward(&tag)
                .await
                .map(|_| ())
                .map_err(|e| Box::new(e) as HandlerError)
        })
    })
}

fn collect_handler(accumulator: Arc<RollupAccumulator>) -> EventHandler<Increment> {
    Arc::new(move |increment| {
        let accumulator = accumulator.clone();
        Box::pin(async move {
            accumulator.apply(&increment).await;
            Ok(())
        })
    })
}

fn spawn_flusher(
    accumulator: Arc<RollupAccumulator>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = accumulator.flush().await {
                        error!(error = %e, "Periodic rollup flush failed");
                    }
                }
            }
        }
    })
}
