//! Prediction-accuracy scoring against a held-out trajectory suffix.
//!
//! For each of the first `n` positions the engine predicts one hour ahead
//! and measures the great-circle error against the position actually
//! observed next. Wind data for all evaluated hours is fetched in one
//! batched request; hours whose wind is missing (rate-limited batch,
//! binding failure) degrade to persistence and stay finite.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use storage::WindKey;
use strato_common::geo::haversine_km;
use strato_common::{
    PredictionMethod, TrackError, TrackResult, TrackedPosition, WindVector,
};
use windborne::{WindFetcher, WindQuery};

use crate::models::{
    hybrid_combine, persistence_step, trajectory_velocity, wind_step,
};

/// A scored hour: what was predicted vs what actually happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HourPrediction {
    pub hour: u32,
    pub actual: ScoredPoint,
    pub predicted: ScoredPoint,
    pub error_km: f64,
    /// Model actually used for this hour ("persistence_fallback" when the
    /// wind batch came back empty).
    pub method: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoredPoint {
    pub lat: f64,
    pub lon: f64,
    pub ts: DateTime<Utc>,
}

/// Overall value score for one balloon. Lower is better.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueScore {
    pub balloon_id: String,
    pub method: String,
    pub hours_evaluated: u32,
    pub overall_value_score: f64,
    pub hours: Vec<HourPrediction>,
}

/// Score a trajectory under the given method.
///
/// `trajectory` must be oldest-first with at least two positions.
pub async fn score(
    trajectory: &[TrackedPosition],
    hours: u32,
    method: PredictionMethod,
    wind: &dyn WindFetcher,
) -> TrackResult<ValueScore> {
    if trajectory.len() < 2 {
        return Err(TrackError::InvalidArgument(
            "trajectory needs at least two positions to score".to_string(),
        ));
    }

    let n = (hours as usize).min(trajectory.len() - 1);

    let wind_map: HashMap<WindKey, WindVector> = if method == PredictionMethod::Persistence {
        HashMap::new()
    } else {
        let queries: Vec<WindQuery> = trajectory[..n]
            .iter()
            .map(|p| WindQuery::at(p.lat, p.lon, p.alt_km, p.ts))
            .collect();
        match wind.wind_for(&queries).await {
            Ok(map) => map,
            Err(e) => {
                warn!(error = %e, "Wind fetch failed during scoring, falling back to persistence");
                HashMap::new()
            }
        }
    };

    let mut scored = Vec::with_capacity(n);
    let mut total_error = 0.0;

    for i in 0..n {
        let anchor = &trajectory[i];
        let actual = &trajectory[i + 1];
        let velocity = trajectory_velocity(&trajectory[..=i]);

        let wind_sample = wind_map
            .get(&WindKey::quantize(anchor.lat, anchor.lon, anchor.alt_km, anchor.ts));

        let (pred_lat, pred_lon, used) = match (method, wind_sample) {
            (PredictionMethod::Persistence, _) => {
                let (lat, lon) = persistence_step(anchor.lat, anchor.lon, velocity);
                (lat, lon, "persistence")
            }
            (PredictionMethod::Wind, Some(wind)) => {
                let (lat, lon) = wind_step(anchor.lat, anchor.lon, wind);
                (lat, lon, "wind")
            }
            (PredictionMethod::Hybrid, Some(wind)) => {
                let wind_pt = wind_step(anchor.lat, anchor.lon, wind);
                let persist_pt = persistence_step(anchor.lat, anchor.lon, velocity);
                let (lat, lon) = hybrid_combine(wind_pt, persist_pt);
                (lat, lon, "hybrid")
            }
            (_, None) => {
                let (lat, lon) = persistence_step(anchor.lat, anchor.lon, velocity);
                (lat, lon, "persistence_fallback")
            }
        };

        let error_km = haversine_km(pred_lat, pred_lon, actual.lat, actual.lon);
        total_error += error_km;

        scored.push(HourPrediction {
            hour: i as u32,
            actual: ScoredPoint { lat: actual.lat, lon: actual.lon, ts: actual.ts },
            predicted: ScoredPoint { lat: pred_lat, lon: pred_lon, ts: actual.ts },
            error_km,
            method: used.to_string(),
        });
    }

    let overall = total_error / n as f64;
    debug!(
        balloon_id = %trajectory[0].balloon_id,
        hours = n,
        score = overall,
        "Scored trajectory"
    );

    Ok(ValueScore {
        balloon_id: trajectory[0].balloon_id.clone(),
        method: method.as_str().to_string(),
        hours_evaluated: n as u32,
        overall_value_score: overall,
        hours: scored,
    })
}
