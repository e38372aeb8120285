//! Profile query endpoint

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};

use allezon_core::{TimeRange, UserTag, ValidationError};

use crate::{AppState, ServerError};

/// Query string of a profile request
#[derive(Debug, Deserialize)]
pub struct ProfileParams {
    pub time_range: Option<String>,
    pub limit: Option<String>,
}

/// Profile response
#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub cookie: String,
    pub views: Vec<UserTag>,
    pub buys: Vec<UserTag>,
}

/// POST /user_profiles/:cookie - newest tags of one user within a time range
pub async fn post_user_profile(
    State(state): State<Arc<AppState>>,
    Path(cookie): Path<String>,
    Query(params): Query<ProfileParams>,
) -> Result<Json<ProfileResponse>, ServerError> {
    let range = params
        .time_range
        .as_deref()
        .ok_or(ValidationError::MissingParameter("time_range"))
        .and_then(TimeRange::parse)?;
    let limit = match params.limit.as_deref() {
        Some(text) => text
            .parse::<usize>()
            .map_err(|_| ValidationError::InvalidParameter {
                name: "limit",
                value: text.to_string(),
            })?,
        None => state.query_config.default_profile_limit,
    };

    let profile = state.profiles.read(&cookie).await?.window(&range, limit);

    Ok(Json(ProfileResponse {
        cookie,
        views: profile.views,
        buys: profile.buys,
    }))
}
