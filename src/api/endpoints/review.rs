//! Review queue: documents whose latest attempt asked for a human, and
//! the apply endpoint that writes a human-edited result back through the
//! same atomic single-update contract as the machine path.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use crate::api::error::ApiError;
use crate::archive::models::Document;
use crate::classifier::pipeline::EditedFields;
use crate::db::repository::{insert_outcome, review_queue, OutcomeRecord};
use crate::state::AppState;

/// One pending review with everything the UI needs to render it.
#[derive(Debug, Serialize)]
pub struct ReviewItem {
    pub document_id: i64,
    pub attempt_id: String,
    pub processed_at: String,
    pub model: String,
    pub confidence: Option<String>,
    pub score: Option<f64>,
    pub reasoning: Option<String>,
    /// Resolved classification (archive ids) as evaluated by the pipeline.
    pub resolved: Option<serde_json::Value>,
    /// Entities the proposal referenced but the archive does not know.
    pub create_candidates: Option<serde_json::Value>,
}

impl From<OutcomeRecord> for ReviewItem {
    fn from(record: OutcomeRecord) -> Self {
        Self {
            document_id: record.document_id,
            attempt_id: record.attempt_id,
            processed_at: record.processed_at,
            model: record.model,
            confidence: record.confidence,
            score: record.score,
            reasoning: record.reasoning,
            resolved: record
                .resolved_json
                .as_deref()
                .and_then(|s| serde_json::from_str(s).ok()),
            create_candidates: record
                .create_candidates_json
                .as_deref()
                .and_then(|s| serde_json::from_str(s).ok()),
        }
    }
}

/// GET /api/review
pub async fn list(State(state): State<Arc<AppState>>) -> Result<Json<Vec<ReviewItem>>, ApiError> {
    let records = {
        let conn = state.lock_db();
        review_queue(&conn)?
    };
    Ok(Json(records.into_iter().map(ReviewItem::from).collect()))
}

/// POST /api/review/{id}/apply
///
/// Applies the human-edited field set in one atomic update (status
/// "manual") and appends an outcome row so the document leaves the
/// review queue.
pub async fn apply(
    State(state): State<Arc<AppState>>,
    Path(document_id): Path<i64>,
    Json(edited): Json<EditedFields>,
) -> Result<Json<Document>, ApiError> {
    let updated = tokio::task::spawn_blocking(move || {
        let updated = state.pipeline.apply_edited(document_id, &edited)?;

        let mut record = OutcomeRecord::begin(document_id);
        record.status = "manual".to_string();
        {
            let conn = state.lock_db();
            if let Err(e) = insert_outcome(&conn, &record) {
                tracing::error!(document_id, error = %e, "could not record manual apply");
            }
        }
        Ok::<_, ApiError>(updated)
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))??;

    Ok(Json(updated))
}
