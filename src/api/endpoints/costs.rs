use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::api::error::ApiError;
use crate::db::repository::{monthly_cost, recent_outcomes, OutcomeRecord};
use crate::state::AppState;

#[derive(Serialize)]
pub struct CostsResponse {
    /// `"YYYY-MM"` of the reported month.
    pub month: String,
    pub total_usd: f64,
    pub budget_usd: f64,
    pub budget_reached: bool,
    pub recent: Vec<OutcomeRecord>,
}

/// GET /api/costs — month-to-date spend and recent attempts.
pub async fn summary(State(state): State<Arc<AppState>>) -> Result<Json<CostsResponse>, ApiError> {
    let month = Utc::now().format("%Y-%m").to_string();
    let (total_usd, recent) = {
        let conn = state.lock_db();
        (monthly_cost(&conn, &month)?, recent_outcomes(&conn, 20)?)
    };
    let budget_usd = state.settings.monthly_budget_usd;
    Ok(Json(CostsResponse {
        month,
        total_usd,
        budget_usd,
        budget_reached: budget_usd > 0.0 && total_usd >= budget_usd,
        recent,
    }))
}
