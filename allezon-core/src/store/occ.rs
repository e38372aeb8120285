//! Optimistic read-modify-write over a [`KvBackend`].

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::backend::{Generation, KvBackend};
use super::error::{Result, StoreError};

/// Typed view of one backend namespace, updated with generation checks.
pub struct OccStore<T> {
    backend: Arc<dyn KvBackend>,
    namespace: String,
    op_timeout: Duration,
    _value: PhantomData<fn() -> T>,
}

impl<T> Clone for OccStore<T> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            namespace: self.namespace.clone(),
            op_timeout: self.op_timeout,
            _value: PhantomData,
        }
    }
}

impl<T> OccStore<T>
where
    T: Serialize + DeserializeOwned + Clone + Send,
{
    pub fn new(
        backend: Arc<dyn KvBackend>,
        namespace: impl Into<String>,
        op_timeout: Duration,
    ) -> Self {
        Self {
            backend,
            namespace: namespace.into(),
            op_timeout,
            _value: PhantomData,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn backend(&self) -> &Arc<dyn KvBackend> {
        &self.backend
    }

    /// Read the current value, `NotFound` if the key was never written.
    pub async fn get(&self, key: &str) -> Result<T> {
        self.read(key)
            .await?
            .map(|(value, _)| value)
            .ok_or_else(|| StoreError::NotFound {
                namespace: self.namespace.clone(),
                key: key.to_string(),
            })
    }

    /// Apply `modify` to the stored value and write it back conditionally.
    ///
    /// An absent key starts from a clone of `default`. On a generation
    /// mismatch the value is re-read and `modify` runs again, up to
    /// `max_retries` attempts in total. Any other error aborts at once.
    pub async fn rmw<F>(&self, key: &str, max_retries: u32, default: &T, mut modify: F) -> Result<T>
    where
        F: FnMut(&mut T) + Send,
    {
        for attempt in 1..=max_retries {
            let (mut value, generation) = match self.read(key).await? {
                Some(current) => current,
                None => (default.clone(), 0),
            };

            modify(&mut value);

            let bytes = serde_json::to_vec(&value)?;
            match self.write(key, bytes, generation).await {
                Ok(_) => return Ok(value),
                Err(StoreError::GenerationMismatch { .. }) => {
                    debug!(
                        namespace = %self.namespace,
                        key,
                        attempt,
                        generation,
                        "Generation mismatch, retrying"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        warn!(
            namespace = %self.namespace,
            key,
            attempts = max_retries,
            "Read-modify-write retries exhausted"
        );
        Err(StoreError::RetriesExhausted {
            key: key.to_string(),
            attempts: max_retries,
        })
    }

    async fn read(&self, key: &str) -> Result<Option<(T, Generation)>> {
        let stored = self
            .deadline(self.backend.get(&self.namespace, key))
            .await?;
        match stored {
            Some(versioned) => {
                let value = serde_json::from_slice(&versioned.value)?;
                Ok(Some((value, versioned.generation)))
            }
            None => Ok(None),
        }
    }

    async fn write(&self, key: &str, bytes: Vec<u8>, expected: Generation) -> Result<Generation> {
        self.deadline(self.backend.put(&self.namespace, key, bytes, expected))
            .await
    }

    async fn deadline<R>(&self, call: impl Future<Output = Result<R>>) -> Result<R> {
        tokio::time::timeout(self.op_timeout, call)
            .await
            .map_err(|_| StoreError::Timeout(self.op_timeout))?
    }
}
