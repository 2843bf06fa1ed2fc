//! Health check handler.

use std::sync::Arc;

use axum::{extract::State, Json};
use chrono::Utc;

use super::AppState;
use crate::web::dto::{ApiResponse, HealthResponse};
use crate::web::error::ApiError;

/// GET /health - Liveness plus a disk usage snapshot.
pub async fn health(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<HealthResponse>>, ApiError> {
    let usage = state.storage.disk_usage().await.map_err(|e| state.error(e))?;

    Ok(Json(ApiResponse::new(HealthResponse {
        status: "ok",
        timestamp: Utc::now(),
        storage_dir: state.storage.root().path().display().to_string(),
        disk_usage: usage.into(),
    })))
}
