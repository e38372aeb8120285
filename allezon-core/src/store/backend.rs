//! Abstract versioned key-value backend.

use async_trait::async_trait;

use super::error::Result;

/// Backend version counter. `0` means "absent" when used as an expectation.
pub type Generation = u32;

/// Stored bytes and the generation they were written at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned {
    pub value: Vec<u8>,
    pub generation: Generation,
}

/// Key-value store with compare-and-swap writes.
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Current value of `key`, or `None` if it was never written.
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Versioned>>;

    /// Write `value` if the stored generation equals `expected`.
    ///
    /// `expected == 0` creates the key and fails if it already exists.
    /// Returns the new generation, or
    /// [`StoreError::GenerationMismatch`](super::StoreError::GenerationMismatch).
    async fn put(
        &self,
        namespace: &str,
        key: &str,
        value: Vec<u8>,
        expected: Generation,
    ) -> Result<Generation>;

    /// Connectivity check for readiness probes.
    async fn ping(&self) -> Result<()>;
}
