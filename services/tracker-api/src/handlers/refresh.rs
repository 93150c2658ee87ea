//! Manual refresh handler.

use std::sync::Arc;

use axum::{
    extract::Extension,
    response::{IntoResponse, Response},
    Json,
};
use tracing::info;

use crate::handlers::error_response;
use crate::state::AppState;

/// POST /refresh
///
/// Runs one controller tick. Reentrant-safe: a tick already in flight
/// finishes first and this call then observes the updated window.
pub async fn refresh_handler(Extension(state): Extension<Arc<AppState>>) -> Response {
    info!("Manual refresh requested");

    match state.controller.trigger_once().await {
        Ok(report) => Json(report).into_response(),
        Err(e) => error_response(&e),
    }
}
