//! Balloon listing, detail, bulk history and value-score handlers.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use prediction::score;
use strato_common::{PredictionMethod, TrackError, TrackedPosition};
use windborne::WindFetcher;

use crate::handlers::error_response;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct BalloonsQuery {
    pub hour_offset: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct BalloonsResponse {
    pub updated_at: Option<DateTime<Utc>>,
    pub data_age_minutes: Option<i64>,
    pub balloon_count: usize,
    pub hour_offset: u32,
    pub balloons: Vec<TrackedPosition>,
}

/// GET /balloons?hour_offset=N
pub async fn list_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<BalloonsQuery>,
) -> Response {
    let hour_offset = params.hour_offset.unwrap_or(0);

    let (_, balloons) = match state.query.positions_at(hour_offset).await {
        Ok(result) => result,
        Err(e) => return error_response(&e),
    };

    let (updated_at, data_age_minutes) = match state.query.data_age().await {
        Ok(result) => result,
        Err(e) => return error_response(&e),
    };

    Json(BalloonsResponse {
        updated_at,
        data_age_minutes,
        balloon_count: balloons.len(),
        hour_offset,
        balloons,
    })
    .into_response()
}

/// GET /balloons/history
pub async fn history_handler(Extension(state): Extension<Arc<AppState>>) -> Response {
    match state.query.history_trails().await {
        Ok(trails) => Json(trails).into_response(),
        Err(e) => error_response(&e),
    }
}

/// GET /balloons/:id?hour_offset=N
pub async fn detail_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(balloon_id): Path<String>,
    Query(params): Query<BalloonsQuery>,
) -> Response {
    let hour_offset = params.hour_offset.unwrap_or(0);

    match state.query.trajectory_partitioned(&balloon_id, hour_offset).await {
        Ok(view) => Json(serde_json::json!({
            "balloon_id": view.balloon_id,
            "trajectory": {
                "historical_positions": view.historical_positions,
                "future_positions": view.future_positions,
            },
            "reference_hour_offset": view.reference_hour_offset,
        }))
        .into_response(),
        Err(e) => error_response(&e),
    }
}

#[derive(Debug, Deserialize)]
pub struct ValueQuery {
    pub hours: Option<u32>,
    pub method: Option<String>,
}

/// GET /balloons/:id/value?hours=H&method=M
pub async fn value_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(balloon_id): Path<String>,
    Query(params): Query<ValueQuery>,
) -> Response {
    let hours = params.hours.unwrap_or(24);
    if !(1..=24).contains(&hours) {
        return error_response(&TrackError::InvalidArgument(format!(
            "hours {} out of range [1,24]",
            hours
        )));
    }

    let method = match parse_method(params.method.as_deref(), PredictionMethod::Hybrid) {
        Ok(method) => method,
        Err(e) => return error_response(&e),
    };

    let trajectory = match state.query.trajectory(&balloon_id).await {
        Ok(trajectory) => trajectory,
        Err(e) => return error_response(&e),
    };

    match score(&trajectory, hours, method, state.wind.as_ref() as &dyn WindFetcher).await {
        Ok(value) => Json(value).into_response(),
        Err(e) => error_response(&e),
    }
}

pub(crate) fn parse_method(
    raw: Option<&str>,
    default: PredictionMethod,
) -> Result<PredictionMethod, TrackError> {
    match raw {
        None => Ok(default),
        Some(s) => PredictionMethod::parse(s).ok_or_else(|| {
            TrackError::InvalidArgument(format!(
                "method '{}' not one of persistence, wind, hybrid",
                s
            ))
        }),
    }
}
