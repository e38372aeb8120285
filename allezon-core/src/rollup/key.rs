//! Rollup key derivation.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::dimensions::Dimension;
use crate::model::{Action, format_bucket};

/// Separates dimension fields in the digest input so adjacent values
/// cannot run into each other.
const FIELD_SEPARATOR: char = '\u{1f}';

/// SHA-256 digest identifying one (bucket, action, dimension subset) cell,
/// held as 64 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RollupKey(String);

impl RollupKey {
    fn from_digest(digest: [u8; 32]) -> Self {
        Self(hex::encode(digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for RollupKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RollupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derive the key for `bucket`, `action` and the present dimensions.
///
/// `dims` must already be in canonical order with absent dimensions
/// removed; a different order yields a different key.
pub fn derive_key(bucket: DateTime<Utc>, action: Action, dims: &[(Dimension, &str)]) -> RollupKey {
    let mut hasher = Sha256::new();
    hasher.update(format_bucket(bucket).as_bytes());
    hasher.update(action.as_str().as_bytes());
    for (dimension, value) in dims {
        let mut field = String::with_capacity(value.len() + 16);
        field.push(FIELD_SEPARATOR);
        field.push_str(dimension.as_str());
        field.push('=');
        field.push_str(value);
        hasher.update(field.as_bytes());
    }
    RollupKey::from_digest(hasher.finalize().into())
}
