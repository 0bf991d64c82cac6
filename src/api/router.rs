//! API router.
//!
//! Returns a composable `Router` with all endpoints under `/api/`.
//! The service binds to localhost by default; there is no auth layer —
//! deployment-level network isolation is assumed.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::api::endpoints;
use crate::state::AppState;

pub fn api_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(endpoints::health::check))
        .route("/api/status", get(endpoints::status::snapshot))
        .route("/api/poller/pause", post(endpoints::status::pause))
        .route("/api/poller/resume", post(endpoints::status::resume))
        .route("/api/review", get(endpoints::review::list))
        .route("/api/review/:id/apply", post(endpoints::review::apply))
        .route("/api/entities", post(endpoints::entities::create))
        .route(
            "/api/documents/:id/process",
            post(endpoints::documents::process),
        )
        .route("/api/costs", get(endpoints::costs::summary))
        .with_state(state)
}
