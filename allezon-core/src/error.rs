//! Error types for allezon-core

use thiserror::Error;

use crate::aggregate::QueryError;
use crate::ingest::IngestError;
use crate::store::StoreError;

/// Top-level error type for allezon-core
#[derive(Error, Debug)]
pub enum AllezonError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Ingest error: {0}")]
    Ingest(#[from] IngestError),

    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    #[error("Event log error: {0}")]
    Log(#[from] allezon_log::Error),
}

/// Malformed input. Never retried; surfaced to callers as a client error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{value:?} is not a valid {kind}")]
    InvalidEnum { kind: &'static str, value: String },

    #[error("invalid datetime {value:?}, expected {expected}")]
    InvalidDatetime {
        value: String,
        expected: &'static str,
    },

    #[error("invalid time range {0:?}, expected <start>_<end>")]
    InvalidTimeRange(String),

    #[error("time range end {end} is not after its start {start}")]
    EmptyTimeRange { start: String, end: String },

    #[error("time range covers {buckets} buckets, the limit is {max}")]
    TimeRangeTooLarge { buckets: i64, max: i64 },

    #[error("required parameter '{0}' is missing")]
    MissingParameter(&'static str),

    #[error("invalid value {value:?} for parameter '{name}'")]
    InvalidParameter { name: &'static str, value: String },

    #[error("malformed user tag: {0}")]
    MalformedTag(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_enum_names_offending_value() {
        let error = ValidationError::InvalidEnum {
            kind: "action",
            value: "CLICK".to_string(),
        };
        assert_eq!(error.to_string(), "\"CLICK\" is not a valid action");
    }

    #[test]
    fn missing_parameter_displays_name() {
        let error = ValidationError::MissingParameter("time_range");
        assert!(error.to_string().contains("'time_range'"));
    }

    #[test]
    fn allezon_error_converts_from_validation_error() {
        let error: AllezonError = ValidationError::InvalidTimeRange("x".into()).into();
        assert!(matches!(error, AllezonError::Validation(_)));
        assert!(error.to_string().starts_with("Validation error"));
    }

    #[test]
    fn allezon_error_converts_from_store_error() {
        let error: AllezonError = StoreError::Backend("down".into()).into();
        assert!(matches!(error, AllezonError::Store(_)));
    }
}
