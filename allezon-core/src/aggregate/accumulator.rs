//! Buffered rollup accumulator.
//!
//! Increments are summed into sharded in-memory buffers and flushed to a
//! [`RollupTable`] periodically. A flush swaps a shard's buffer into an
//! in-flight map and writes it out without holding the shard lock, so
//! `apply` never waits on the table. A key is marked as writing while its
//! delta is on its way to the table; lookups wait for that one write and
//! retry when their table read may have raced a write, so a delta is
//! counted exactly once.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, error};

use super::forwarder::Increment;
use super::table::{RollupCounter, RollupTable};
use crate::rollup::RollupKey;
use crate::store::{Result, StoreError};

/// Point lookups of rollup counters.
#[async_trait]
pub trait RollupLookup: Send + Sync {
    async fn lookup(&self, key: &RollupKey) -> Result<Option<RollupCounter>>;
}

type Buffer = HashMap<RollupKey, RollupCounter>;

/// A drained delta that has not reached the table yet.
struct InFlight {
    delta: RollupCounter,
    writing: bool,
}

#[derive(Default)]
struct ShardState {
    buffer: Buffer,
    in_flight: HashMap<RollupKey, InFlight>,
    /// Bumped every time the buffer is swapped out.
    swaps: u64,
}

impl ShardState {
    fn is_writing(&self, key: &RollupKey) -> bool {
        self.in_flight.get(key).is_some_and(|entry| entry.writing)
    }

    fn restore(&mut self, key: RollupKey, delta: RollupCounter) {
        self.buffer.entry(key).or_default().merge(delta);
    }
}

struct Shard {
    state: Mutex<ShardState>,
    /// Signalled whenever an in-flight key settles.
    settled: Notify,
}

/// What a lookup saw in a shard before reading the table.
struct Snapshot {
    unflushed: Option<RollupCounter>,
    in_flight: bool,
    swaps: u64,
}

impl Snapshot {
    fn take(state: &ShardState, key: &RollupKey) -> Self {
        let in_flight = state.in_flight.get(key).map(|entry| entry.delta);
        let unflushed = match (state.buffer.get(key).copied(), in_flight) {
            (Some(mut buffered), Some(delta)) => {
                buffered.merge(delta);
                Some(buffered)
            }
            (buffered, delta) => buffered.or(delta),
        };
        Self {
            unflushed,
            in_flight: in_flight.is_some(),
            swaps: state.swaps,
        }
    }

    /// No write of this key can have reached the table since the snapshot.
    fn still_holds(&self, state: &ShardState, key: &RollupKey) -> bool {
        state.swaps == self.swaps
            && (!self.in_flight || state.in_flight.get(key).is_some_and(|entry| !entry.writing))
    }

    fn combine(self, stored: Option<RollupCounter>) -> Option<RollupCounter> {
        match (stored, self.unflushed) {
            (Some(mut total), Some(delta)) => {
                total.merge(delta);
                Some(total)
            }
            (stored, unflushed) => stored.or(unflushed),
        }
    }
}

pub struct RollupAccumulator {
    shards: Vec<Shard>,
    table: Arc<dyn RollupTable>,
    flushing: Mutex<()>,
}

impl RollupAccumulator {
    pub fn new(table: Arc<dyn RollupTable>, shards: usize) -> Self {
        let shards = (0..shards.max(1))
            .map(|_| Shard {
                state: Mutex::new(ShardState::default()),
                settled: Notify::new(),
            })
            .collect();
        Self {
            shards,
            table,
            flushing: Mutex::new(()),
        }
    }

    fn shard(&self, key: &RollupKey) -> &Shard {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() % self.shards.len() as u64) as usize]
    }

    /// Count one increment.
    pub async fn apply(&self, increment: &Increment) {
        let mut state = self.shard(&increment.key).state.lock().await;
        state
            .buffer
            .entry(increment.key.clone())
            .or_default()
            .record(increment.price);
    }

    /// Keys waiting to be flushed, including those being written right now.
    pub async fn pending(&self) -> usize {
        let mut total = 0;
        for shard in &self.shards {
            let state = shard.state.lock().await;
            total += state.buffer.len() + state.in_flight.len();
        }
        total
    }

    /// Move every buffered counter into the table.
    ///
    /// Counters that fail to reach the table are put back into their
    /// buffer and retried on the next flush. All shards are attempted; the
    /// first error is returned. Flushes run one at a time.
    pub async fn flush(&self) -> Result<usize> {
        let _flushing = self.flushing.lock().await;
        let mut flushed = 0;
        let mut first_error: Option<StoreError> = None;

        for (index, shard) in self.shards.iter().enumerate() {
            match self.flush_shard(shard).await {
                Ok(count) => flushed += count,
                Err((count, e)) => {
                    error!(shard = index, error = %e, "Rollup flush failed");
                    flushed += count;
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                if flushed > 0 {
                    debug!(keys = flushed, "Flushed rollup counters");
                }
                Ok(flushed)
            }
        }
    }

    async fn flush_shard(&self, shard: &Shard) -> std::result::Result<usize, (usize, StoreError)> {
        let keys: Vec<RollupKey> = {
            let mut state = shard.state.lock().await;
            if state.buffer.is_empty() {
                return Ok(0);
            }
            state.swaps += 1;
            let drained = std::mem::take(&mut state.buffer);
            let keys = drained.keys().cloned().collect();
            state.in_flight = drained
                .into_iter()
                .map(|(key, delta)| (key, InFlight { delta, writing: false }))
                .collect();
            keys
        };

        let mut flushed = 0;
        let mut failure = None;
        for key in keys {
            let delta = {
                let mut state = shard.state.lock().await;
                match state.in_flight.get_mut(&key) {
                    Some(entry) => {
                        entry.writing = true;
                        entry.delta
                    }
                    None => continue,
                }
            };

            let result = self.table.add(&key, delta).await;

            let mut state = shard.state.lock().await;
            state.in_flight.remove(&key);
            match result {
                Ok(()) => flushed += 1,
                Err(e) => {
                    debug!(key = %key, error = %e, "Rollup counter write failed");
                    state.restore(key, delta);
                    failure = Some(e);
                }
            }
            drop(state);
            shard.settled.notify_waiters();
            if failure.is_some() {
                break;
            }
        }

        let mut state = shard.state.lock().await;
        let unwritten: Vec<(RollupKey, InFlight)> = state.in_flight.drain().collect();
        for (key, entry) in unwritten {
            state.restore(key, entry.delta);
        }
        drop(state);

        match failure {
            Some(e) => Err((flushed, e)),
            None => Ok(flushed),
        }
    }
}

#[async_trait]
impl RollupLookup for RollupAccumulator {
    async fn lookup(&self, key: &RollupKey) -> Result<Option<RollupCounter>> {
        let shard = self.shard(key);
        loop {
            let snapshot = {
                let state = shard.state.lock().await;
                if state.is_writing(key) {
                    let settled = shard.settled.notified();
                    tokio::pin!(settled);
                    settled.as_mut().enable();
                    drop(state);
                    settled.await;
                    continue;
                }
                Snapshot::take(&state, key)
            };

            let stored = self.table.get(key).await?;

            if snapshot.still_holds(&*shard.state.lock().await, key) {
                return Ok(snapshot.combine(stored));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::table::KvRollupTable;
    use crate::config::{RollupConfig, StoreConfig};
    use crate::model::Action;
    use crate::rollup::derive_key;
    use crate::store::MemoryKvBackend;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::{Duration, Instant};

    fn key(minute: u32) -> RollupKey {
        let bucket = Utc.with_ymd_and_hms(2024, 1, 1, 0, minute, 0).unwrap();
        derive_key(bucket, Action::View, &[])
    }

    fn kv_table() -> Arc<KvRollupTable> {
        Arc::new(KvRollupTable::new(
            Arc::new(MemoryKvBackend::new(4)),
            &StoreConfig::default(),
            &RollupConfig::default(),
        ))
    }

    fn increment(minute: u32, price: i64) -> Increment {
        Increment {
            key: key(minute),
            price,
        }
    }

    /// Table that refuses writes while `failing` is set.
    struct Flaky {
        inner: Arc<KvRollupTable>,
        failing: AtomicBool,
    }

    #[async_trait]
    impl RollupTable for Flaky {
        async fn add(&self, key: &RollupKey, delta: RollupCounter) -> Result<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(StoreError::Backend("unavailable".into()));
            }
            self.inner.add(key, delta).await
        }

        async fn get(&self, key: &RollupKey) -> Result<Option<RollupCounter>> {
            self.inner.get(key).await
        }
    }

    /// Table whose reads and writes take a while.
    struct Slow {
        inner: Arc<KvRollupTable>,
        add_delay: Duration,
        get_delay: Duration,
    }

    #[async_trait]
    impl RollupTable for Slow {
        async fn add(&self, key: &RollupKey, delta: RollupCounter) -> Result<()> {
            tokio::time::sleep(self.add_delay).await;
            self.inner.add(key, delta).await
        }

        async fn get(&self, key: &RollupKey) -> Result<Option<RollupCounter>> {
            tokio::time::sleep(self.get_delay).await;
            self.inner.get(key).await
        }
    }

    #[tokio::test]
    async fn lookup_sees_buffered_increments() {
        let accumulator = RollupAccumulator::new(kv_table(), 4);
        accumulator.apply(&increment(0, 100)).await;
        accumulator.apply(&increment(0, 50)).await;

        assert_eq!(
            accumulator.lookup(&key(0)).await.unwrap(),
            Some(RollupCounter::new(2, 150))
        );
        assert_eq!(accumulator.lookup(&key(1)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn flush_moves_counters_without_double_counting() {
        let table = kv_table();
        let accumulator = RollupAccumulator::new(table.clone(), 4);
        accumulator.apply(&increment(0, 100)).await;
        accumulator.apply(&increment(1, 7)).await;

        assert_eq!(accumulator.flush().await.unwrap(), 2);
        assert_eq!(accumulator.pending().await, 0);
        assert_eq!(table.get(&key(0)).await.unwrap(), Some(RollupCounter::new(1, 100)));

        accumulator.apply(&increment(0, 1)).await;
        assert_eq!(
            accumulator.lookup(&key(0)).await.unwrap(),
            Some(RollupCounter::new(2, 101))
        );
    }

    #[tokio::test]
    async fn failed_flush_keeps_counters_buffered() {
        let table = Arc::new(Flaky {
            inner: kv_table(),
            failing: AtomicBool::new(true),
        });
        let accumulator = RollupAccumulator::new(table.clone(), 2);
        for minute in 0..5 {
            accumulator.apply(&increment(minute, 10)).await;
        }

        assert!(accumulator.flush().await.is_err());
        assert_eq!(accumulator.pending().await, 5);
        assert_eq!(
            accumulator.lookup(&key(3)).await.unwrap(),
            Some(RollupCounter::new(1, 10))
        );

        table.failing.store(false, Ordering::SeqCst);
        assert_eq!(accumulator.flush().await.unwrap(), 5);
        assert_eq!(table.get(&key(3)).await.unwrap(), Some(RollupCounter::new(1, 10)));
    }

    #[tokio::test]
    async fn result_is_independent_of_order() {
        let prices = [5_i64, -3, 12, 40, 0, 7];

        let forward = RollupAccumulator::new(kv_table(), 4);
        for (i, price) in prices.iter().enumerate() {
            forward.apply(&increment(0, *price)).await;
            if i == 2 {
                forward.flush().await.unwrap();
            }
        }

        let backward = RollupAccumulator::new(kv_table(), 4);
        for price in prices.iter().rev() {
            backward.apply(&increment(0, *price)).await;
        }

        let expected = Some(RollupCounter::new(6, 61));
        assert_eq!(forward.lookup(&key(0)).await.unwrap(), expected);
        assert_eq!(backward.lookup(&key(0)).await.unwrap(), expected);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_apply_and_flush_lose_nothing() {
        let accumulator = Arc::new(RollupAccumulator::new(kv_table(), 4));

        let writers: Vec<_> = (0..8)
            .map(|_| {
                let accumulator = accumulator.clone();
                tokio::spawn(async move {
                    for i in 0..250 {
                        accumulator.apply(&increment(i % 3, 2)).await;
                    }
                })
            })
            .collect();
        let flusher = {
            let accumulator = accumulator.clone();
            tokio::spawn(async move {
                for _ in 0..20 {
                    accumulator.flush().await.unwrap();
                    tokio::task::yield_now().await;
                }
            })
        };
        for writer in writers {
            writer.await.unwrap();
        }
        flusher.await.unwrap();
        accumulator.flush().await.unwrap();

        let mut count = 0;
        let mut sum = 0;
        for minute in 0..3 {
            let counter = accumulator.lookup(&key(minute)).await.unwrap().unwrap();
            count += counter.count;
            sum += counter.sum_price;
        }
        assert_eq!(count, 2000);
        assert_eq!(sum, 4000);
    }

    #[tokio::test]
    async fn apply_does_not_wait_for_a_running_flush() {
        let table = Arc::new(Slow {
            inner: kv_table(),
            add_delay: Duration::from_millis(100),
            get_delay: Duration::ZERO,
        });
        let accumulator = Arc::new(RollupAccumulator::new(table, 1));
        for minute in 0..10 {
            accumulator.apply(&increment(minute, 1)).await;
        }

        let flushing = {
            let accumulator = accumulator.clone();
            tokio::spawn(async move { accumulator.flush().await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;

        let started = Instant::now();
        accumulator.apply(&increment(0, 5)).await;
        assert!(started.elapsed() < Duration::from_millis(50));

        // Mid-flush lookups count each delta exactly once.
        assert_eq!(
            accumulator.lookup(&key(9)).await.unwrap(),
            Some(RollupCounter::new(1, 1))
        );
        assert_eq!(
            accumulator.lookup(&key(0)).await.unwrap(),
            Some(RollupCounter::new(2, 6))
        );

        assert_eq!(flushing.await.unwrap().unwrap(), 10);
        assert_eq!(accumulator.pending().await, 1);
        assert_eq!(
            accumulator.lookup(&key(0)).await.unwrap(),
            Some(RollupCounter::new(2, 6))
        );
    }

    #[tokio::test]
    async fn apply_does_not_wait_for_a_table_read() {
        let table = Arc::new(Slow {
            inner: kv_table(),
            add_delay: Duration::ZERO,
            get_delay: Duration::from_millis(200),
        });
        let accumulator = Arc::new(RollupAccumulator::new(table, 1));
        accumulator.apply(&increment(0, 1)).await;

        let looking = {
            let accumulator = accumulator.clone();
            tokio::spawn(async move { accumulator.lookup(&key(0)).await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;

        let started = Instant::now();
        accumulator.apply(&increment(1, 1)).await;
        assert!(started.elapsed() < Duration::from_millis(50));

        assert_eq!(looking.await.unwrap().unwrap(), Some(RollupCounter::new(1, 1)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn lookups_racing_flushes_never_double_count() {
        let table = Arc::new(Slow {
            inner: kv_table(),
            add_delay: Duration::from_millis(1),
            get_delay: Duration::from_millis(1),
        });
        let accumulator = Arc::new(RollupAccumulator::new(table, 2));
        for _ in 0..50 {
            accumulator.apply(&increment(0, 1)).await;
        }

        let flusher = {
            let accumulator = accumulator.clone();
            tokio::spawn(async move {
                for _ in 0..20 {
                    accumulator.apply(&increment(0, 1)).await;
                    accumulator.flush().await.unwrap();
                }
            })
        };

        let mut last = 0;
        while !flusher.is_finished() {
            let counter = accumulator.lookup(&key(0)).await.unwrap().unwrap();
            assert_eq!(counter.count as i64, counter.sum_price);
            assert!(counter.count >= last, "count went backwards");
            assert!(counter.count <= 70);
            last = counter.count;
        }
        flusher.await.unwrap();

        assert_eq!(
            accumulator.lookup(&key(0)).await.unwrap(),
            Some(RollupCounter::new(70, 70))
        );
    }
}
