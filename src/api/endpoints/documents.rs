//! Manual processing trigger — runs one document through the pipeline
//! outside the polling schedule (webhook-style entry point).

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;

use crate::api::error::ApiError;
use crate::classifier::pipeline::PipelineOutcome;
use crate::state::AppState;

/// POST /api/documents/{id}/process
pub async fn process(
    State(state): State<Arc<AppState>>,
    Path(document_id): Path<i64>,
) -> Result<Json<PipelineOutcome>, ApiError> {
    let outcome = tokio::task::spawn_blocking(move || {
        state.pipeline.process_document(document_id)
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))?
    .map_err(|_| ApiError::Overloaded)?;

    Ok(Json(outcome))
}
