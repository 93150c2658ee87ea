//! HTTP handlers: thin request-to-service translation.

pub mod balloons;
pub mod health;
pub mod refresh;
pub mod trajectory;

use axum::http::{header, StatusCode};
use axum::response::Response;

use strato_common::TrackError;

/// Render a TrackError as the standard JSON error body.
pub fn error_response(err: &TrackError) -> Response {
    let status = StatusCode::from_u16(err.http_status_code())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = serde_json::json!({
        "error": err.kind(),
        "message": err.to_string(),
    });

    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(body.to_string().into())
        .unwrap()
}
