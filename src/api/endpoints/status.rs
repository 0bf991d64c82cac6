use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use crate::api::error::ApiError;
use crate::scheduler::poller::PollerStatus;
use crate::state::AppState;

/// GET /api/status
pub async fn snapshot(State(state): State<Arc<AppState>>) -> Json<PollerStatus> {
    Json(state.poller.snapshot())
}

/// POST /api/poller/pause
pub async fn pause(State(state): State<Arc<AppState>>) -> Result<Json<PollerStatus>, ApiError> {
    state.poller.pause();
    Ok(Json(state.poller.snapshot()))
}

/// POST /api/poller/resume
pub async fn resume(State(state): State<Arc<AppState>>) -> Result<Json<PollerStatus>, ApiError> {
    state.poller.resume();
    Ok(Json(state.poller.snapshot()))
}
