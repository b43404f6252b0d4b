use axum::{Json, Router, http::StatusCode, routing::post};
use crewsearch_core::SecretValue;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use super::GuardedState;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ResearchRequest {
    pub query: String,
    /// Search credential for this request only; falls back to the server's.
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ResearchResponse {
    pub run_id: Uuid,
    pub answer: String,
}

pub fn research_router() -> Router<AppState> {
    Router::new().route("/research", post(research))
}

#[instrument(skip_all)]
async fn research(
    GuardedState(state): GuardedState,
    Json(payload): Json<ResearchRequest>,
) -> Result<Json<ResearchResponse>, ApiError> {
    let _slot = state.try_acquire_slot().ok_or_else(|| {
        ApiError::new(
            StatusCode::TOO_MANY_REQUESTS,
            "all research slots are busy; retry later",
        )
    })?;

    let service = state.research();
    let report = match payload
        .api_key
        .filter(|key| !key.trim().is_empty())
    {
        Some(key) => {
            service
                .try_research_with_credential(&payload.query, SecretValue::new(key))
                .await?
        }
        None => service.try_research(&payload.query).await?,
    };

    info!(run_id = %report.run_id, "research request served");
    Ok(Json(ResearchResponse {
        run_id: report.run_id,
        answer: report.answer,
    }))
}
