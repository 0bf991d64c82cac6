//! Human-gated entity creation.
//!
//! The pipeline never creates archive entities on its own; a reviewer
//! promotes create-candidates through this endpoint. The entity cache is
//! refreshed afterwards so the next resolution pass sees the new name.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Correspondent,
    DocumentType,
    Tag,
    StoragePath,
}

#[derive(Debug, Deserialize)]
pub struct CreateEntityRequest {
    pub kind: EntityKind,
    pub name: String,
    /// Only for storage paths.
    #[serde(default)]
    pub path_template: String,
}

#[derive(Debug, Serialize)]
pub struct CreateEntityResponse {
    pub id: i64,
    pub name: String,
}

/// POST /api/entities
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateEntityRequest>,
) -> Result<Json<CreateEntityResponse>, ApiError> {
    let name = request.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::BadRequest("entity name must not be empty".into()));
    }

    let response = tokio::task::spawn_blocking(move || {
        let id = match request.kind {
            EntityKind::Correspondent => state.archive.create_correspondent(&name)?,
            EntityKind::DocumentType => state.archive.create_document_type(&name)?,
            EntityKind::Tag => state.archive.create_tag(&name)?,
            EntityKind::StoragePath => {
                let template = if request.path_template.is_empty() {
                    "{{created_year}}/{{title}}"
                } else {
                    &request.path_template
                };
                state.archive.create_storage_path(&name, template)?
            }
        };
        tracing::info!(id, %name, "entity created");

        // New names must be visible to the next resolution pass.
        state.refresh_cache()?;

        Ok::<_, ApiError>(CreateEntityResponse { id, name })
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))??;

    Ok(Json(response))
}
