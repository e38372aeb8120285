//! Store error types

use std::time::Duration;

use thiserror::Error;

use super::backend::Generation;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("key {key:?} not found in namespace {namespace:?}")]
    NotFound { namespace: String, key: String },

    /// Conditional write lost a race. Retried inside read-modify-write.
    #[error("generation mismatch on key {key:?} (expected {expected})")]
    GenerationMismatch { key: String, expected: Generation },

    #[error("gave up on key {key:?} after {attempts} attempts")]
    RetriesExhausted { key: String, attempts: u32 },

    #[error("backend call exceeded {0:?}")]
    Timeout(Duration),

    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
