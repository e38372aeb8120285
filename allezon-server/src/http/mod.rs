//! HTTP server module

mod aggregates;
mod health;
mod profiles;
mod tags;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::AppState;

pub use health::HealthResponse;
pub use profiles::ProfileResponse;

/// Create the HTTP router with all routes configured
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/user_tags", post(tags::post_user_tag))
        .route("/user_profiles/:cookie", post(profiles::post_user_profile))
        .route("/aggregates", post(aggregates::post_aggregates))
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
