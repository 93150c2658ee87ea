//! Health handler.

use std::sync::Arc;

use axum::{
    extract::Extension,
    response::{IntoResponse, Response},
    Json,
};

use crate::handlers::error_response;
use crate::state::AppState;

/// GET /health
///
/// Classification is driven purely by data age; the controller phase is
/// included as supporting detail.
pub async fn health_handler(Extension(state): Extension<Arc<AppState>>) -> Response {
    let report = match state.query.health().await {
        Ok(report) => report,
        Err(e) => return error_response(&e),
    };

    let phase = state.controller.phase().await;

    Json(serde_json::json!({
        "status": report.status,
        "updated_at": report.updated_at,
        "data_age_minutes": report.data_age_minutes,
        "balloon_count": report.balloon_count,
        "auto_update": state.auto_update,
        "ingest_phase": phase,
    }))
    .into_response()
}
