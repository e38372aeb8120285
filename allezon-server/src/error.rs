//! Server error types

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use allezon_core::{IngestError, QueryError, StoreError, ValidationError};

use crate::consumers::ConsumerError;

/// Errors that can occur in the allezon server
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to the specified address
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Malformed request
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Query(QueryError),

    #[error(transparent)]
    Consumer(#[from] ConsumerError),

    #[error("event log error: {0}")]
    Log(#[from] allezon_log::Error),

    /// Internal server error
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<QueryError> for ServerError {
    fn from(error: QueryError) -> Self {
        match error {
            QueryError::Validation(e) => ServerError::Validation(e),
            other => ServerError::Query(other),
        }
    }
}

/// JSON body returned with every error status
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ServerError::Bind { .. } => "bind_error",
            ServerError::Validation(_) => "validation_error",
            ServerError::Store(StoreError::Timeout(_)) => "timeout",
            ServerError::Store(StoreError::RetriesExhausted { .. }) => "retries_exhausted",
            ServerError::Store(_) => "store_error",
            ServerError::Ingest(_) => "publish_error",
            ServerError::Query(_) => "query_error",
            ServerError::Consumer(_) => "consumer_error",
            ServerError::Log(_) => "log_error",
            ServerError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.code(), "Request failed");
        } else {
            tracing::debug!(error = %self, code = self.code(), "Rejected request");
        }

        let body = ErrorResponse {
            error: self.to_string(),
            code: self.code().to_string(),
        };
        (status, Json(body)).into_response()
    }
}
