use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::error::ApiError;
use crate::archive::cache::CacheStats;
use crate::config::APP_VERSION;
use crate::scheduler::poller::PollerStatus;
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub cache: CacheStats,
    pub poller: PollerStatus,
}

/// GET /api/health
pub async fn check(State(state): State<Arc<AppState>>) -> Result<Json<HealthResponse>, ApiError> {
    let cache = state.read_cache().stats();
    Ok(Json(HealthResponse {
        status: "ok",
        version: APP_VERSION,
        cache,
        poller: state.poller.snapshot(),
    }))
}
