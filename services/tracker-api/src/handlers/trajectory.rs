//! Predicted-trajectory and wind-field handlers.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Duration;
use serde::Deserialize;

use strato_common::{PredictionMethod, TrackError, WindVector};
use windborne::{altitude_for_pressure, WindFetcher, WindQuery};

use crate::handlers::balloons::parse_method;
use crate::handlers::error_response;
use crate::state::AppState;

/// Hard cap on wind-field grid points per request.
const MAX_GRID_POINTS: usize = 1000;

#[derive(Debug, Deserialize)]
pub struct PredictQuery {
    pub hours: Option<u32>,
    pub method: Option<String>,
}

/// GET /trajectory/:id?hours=H&method=M
pub async fn predict_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(balloon_id): Path<String>,
    Query(params): Query<PredictQuery>,
) -> Response {
    let hours = params.hours.unwrap_or(6);
    if !(1..=12).contains(&hours) {
        return error_response(&TrackError::InvalidArgument(format!(
            "hours {} out of range [1,12]",
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

    // Warm the wind cache at the anchor for each forecast hour. Drift over
    // the horizon stays within a few cache buckets, so anchoring the
    // prefetch at the current position is accurate enough.
    if method != PredictionMethod::Persistence {
        if let Some(current) = trajectory.last() {
            // Anchors for hour k are looked up at the hour they start from.
            let queries: Vec<WindQuery> = (0..hours)
                .map(|k| {
                    WindQuery::at(
                        current.lat,
                        current.lon,
                        current.alt_km,
                        current.ts + Duration::hours(i64::from(k)),
                    )
                })
                .collect();
            if let Err(e) = state.wind.wind_for(&queries).await {
                tracing::warn!(error = %e, "Wind prefetch failed, predictions may degrade");
            }
        }
    }

    let predictions = state.predictor.predict(&trajectory, hours, method).await;

    Json(serde_json::json!({
        "balloon_id": balloon_id,
        "method": method.as_str(),
        "hours": hours,
        "predictions": predictions,
    }))
    .into_response()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindFieldQuery {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lng_min: f64,
    pub lng_max: f64,
    pub grid_size: Option<usize>,
    pub pressure: Option<f64>,
    pub altitude: Option<f64>,
}

/// GET /trajectory/wind-field?latMin&latMax&lngMin&lngMax&gridSize&pressure|altitude
pub async fn wind_field_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<WindFieldQuery>,
) -> Response {
    if params.lat_min >= params.lat_max || params.lng_min >= params.lng_max {
        return error_response(&TrackError::InvalidArgument(
            "bounds must satisfy latMin < latMax and lngMin < lngMax".to_string(),
        ));
    }

    let grid_size = params.grid_size.unwrap_or(10).max(2);
    if grid_size * grid_size > MAX_GRID_POINTS {
        return error_response(&TrackError::InvalidArgument(format!(
            "grid of {}x{} exceeds {} points",
            grid_size, grid_size, MAX_GRID_POINTS
        )));
    }

    // Altitude wins when both are supplied; default is a typical float level.
    let alt_km = match (params.altitude, params.pressure) {
        (Some(alt), _) => alt,
        (None, Some(pressure)) => altitude_for_pressure(pressure),
        (None, None) => 18.0,
    };

    let lat_step = (params.lat_max - params.lat_min) / (grid_size - 1) as f64;
    let lng_step = (params.lng_max - params.lng_min) / (grid_size - 1) as f64;

    let mut queries = Vec::with_capacity(grid_size * grid_size);
    for i in 0..grid_size {
        for j in 0..grid_size {
            queries.push(WindQuery::new(
                params.lat_min + lat_step * i as f64,
                params.lng_min + lng_step * j as f64,
                alt_km,
            ));
        }
    }

    let winds = match state.wind.wind_for(&queries).await {
        Ok(winds) => winds,
        Err(e) => return error_response(&e),
    };

    let mut data: Vec<WindVector> = winds.into_values().collect();
    data.sort_by(|a, b| (a.lat, a.lon).partial_cmp(&(b.lat, b.lon)).unwrap_or(std::cmp::Ordering::Equal));

    Json(serde_json::json!({
        "grid": {
            "lat_min": params.lat_min,
            "lat_max": params.lat_max,
            "lng_min": params.lng_min,
            "lng_max": params.lng_max,
            "grid_size": grid_size,
            "altitude_km": alt_km,
        },
        "count": data.len(),
        "data": data,
    }))
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wind_field_query_parses_camel_case() {
        let query: WindFieldQuery = serde_urlencoded::from_str(
            "latMin=30&latMax=50&lngMin=-120&lngMax=-90&gridSize=5&pressure=70",
        )
        .unwrap();
        assert_eq!(query.grid_size, Some(5));
        assert_eq!(query.pressure, Some(70.0));
        assert!(query.altitude.is_none());
    }
}
