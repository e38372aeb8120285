//! Tag ingestion endpoint

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;

use allezon_core::UserTag;

use crate::{AppState, ServerError};

/// POST /user_tags - record one tag
///
/// The body is decoded by hand so that malformed JSON is a 400 rather than
/// axum's 422.
pub async fn post_user_tag(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<StatusCode, ServerError> {
    let tag = UserTag::from_json(&body)?;
    state.ingestor.ingest(tag).await?;
    Ok(StatusCode::NO_CONTENT)
}
