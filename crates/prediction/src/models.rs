//! Forward-prediction models.
//!
//! Each hour's predicted point becomes the anchor for the next. Persistence
//! extrapolates the smoothed observed velocity; wind drifts the anchor with
//! the cached upper-air wind; hybrid blends the two.

use std::sync::Arc;

use chrono::Duration;
use tracing::debug;

use storage::{WindCache, WindKey};
use strato_common::geo::{normalize_lon, project_forward};
use strato_common::motion::smoothed_velocity;
use strato_common::{
    PredictedPosition, PredictionMethod, TrackedPosition, Velocity, WindVector,
};

/// Weight of the wind component in the hybrid blend.
const HYBRID_WIND_WEIGHT: f64 = 0.6;

/// Confidence for a wind prediction when no wind data is available.
const WIND_MISS_CONFIDENCE: f64 = 0.3;

/// Forecasts future positions from a known trajectory.
pub struct Predictor {
    cache: Arc<WindCache>,
}

impl Predictor {
    pub fn new(cache: Arc<WindCache>) -> Self {
        Self { cache }
    }

    /// Predict `hours` future positions for the trajectory's newest point.
    ///
    /// `trajectory` is oldest-first; its last element is the anchor. Wind
    /// lookups hit only the cache; callers warm it beforehand if they want
    /// wind-driven output.
    pub async fn predict(
        &self,
        trajectory: &[TrackedPosition],
        hours: u32,
        method: PredictionMethod,
    ) -> Vec<PredictedPosition> {
        let Some(current) = trajectory.last() else {
            return Vec::new();
        };

        let velocity = trajectory_velocity(trajectory);
        let mut anchor = (current.lat, current.lon, current.alt_km, current.ts);
        let mut output = Vec::with_capacity(hours as usize);

        for k in 1..=hours {
            let (lat, lon, alt_km, ts) = anchor;
            let next_ts = ts + Duration::hours(1);

            let predicted = match method {
                PredictionMethod::Persistence => {
                    let (plat, plon) = persistence_step(lat, lon, velocity);
                    PredictedPosition {
                        lat: plat,
                        lon: plon,
                        alt_km,
                        ts: next_ts,
                        confidence: persistence_confidence(k),
                        method: "persistence".to_string(),
                    }
                }
                PredictionMethod::Wind => {
                    match self.wind_at(lat, lon, alt_km, ts).await {
                        Some(wind) => {
                            let (plat, plon) = wind_step(lat, lon, &wind);
                            PredictedPosition {
                                lat: plat,
                                lon: plon,
                                alt_km,
                                ts: next_ts,
                                confidence: wind_confidence(k),
                                method: "wind".to_string(),
                            }
                        }
                        None => PredictedPosition {
                            lat,
                            lon,
                            alt_km,
                            ts: next_ts,
                            confidence: WIND_MISS_CONFIDENCE,
                            method: "wind".to_string(),
                        },
                    }
                }
                PredictionMethod::Hybrid => {
                    match self.wind_at(lat, lon, alt_km, ts).await {
                        Some(wind) => {
                            let wind_pt = wind_step(lat, lon, &wind);
                            let persist_pt = persistence_step(lat, lon, velocity);
                            let (plat, plon) = hybrid_combine(wind_pt, persist_pt);
                            PredictedPosition {
                                lat: plat,
                                lon: plon,
                                alt_km,
                                ts: next_ts,
                                confidence: hybrid_confidence(k),
                                method: "hybrid".to_string(),
                            }
                        }
                        None => {
                            debug!(hour = k, "No cached wind at anchor, persistence fallback");
                            let (plat, plon) = persistence_step(lat, lon, velocity);
                            PredictedPosition {
                                lat: plat,
                                lon: plon,
                                alt_km,
                                ts: next_ts,
                                confidence: persistence_confidence(k),
                                method: "persistence_fallback".to_string(),
                            }
                        }
                    }
                }
            };

            anchor = (predicted.lat, predicted.lon, predicted.alt_km, predicted.ts);
            output.push(predicted);
        }

        output
    }

    async fn wind_at(
        &self,
        lat: f64,
        lon: f64,
        alt_km: f64,
        ts: chrono::DateTime<chrono::Utc>,
    ) -> Option<WindVector> {
        let key = WindKey::quantize(lat, lon, alt_km, ts);
        self.cache.get(&key).await
    }
}

/// Smoothed velocity over the trajectory's most recent segments.
pub fn trajectory_velocity(trajectory: &[TrackedPosition]) -> Option<Velocity> {
    let segments: Vec<Velocity> = trajectory
        .iter()
        .filter_map(|p| match (p.speed_kmh, p.heading_deg) {
            (Some(speed), Some(heading)) => Some(Velocity::new(speed, heading)),
            _ => None,
        })
        .collect();
    smoothed_velocity(&segments)
}

/// One-hour persistence displacement.
pub fn persistence_step(lat: f64, lon: f64, velocity: Option<Velocity>) -> (f64, f64) {
    match velocity {
        Some(v) if v.speed_kmh > 0.0 => project_forward(lat, lon, v.heading_deg, v.speed_kmh),
        _ => (lat, lon),
    }
}

/// One-hour wind-drift displacement: move with the wind, i.e. along the
/// bearing opposite the meteorological "from" direction.
pub fn wind_step(lat: f64, lon: f64, wind: &WindVector) -> (f64, f64) {
    let toward = (wind.direction_deg_from + 180.0) % 360.0;
    project_forward(lat, lon, toward, wind.speed_kmh)
}

/// Convex 0.6 wind + 0.4 persistence blend, wrap-safe in longitude.
pub fn hybrid_combine(wind_pt: (f64, f64), persist_pt: (f64, f64)) -> (f64, f64) {
    let lat = HYBRID_WIND_WEIGHT * wind_pt.0 + (1.0 - HYBRID_WIND_WEIGHT) * persist_pt.0;
    let dlon = normalize_lon(persist_pt.1 - wind_pt.1);
    let lon = normalize_lon(wind_pt.1 + (1.0 - HYBRID_WIND_WEIGHT) * dlon);
    (lat, lon)
}

pub fn persistence_confidence(k: u32) -> f64 {
    (0.8 - 0.15 * f64::from(k)).max(0.2)
}

pub fn wind_confidence(k: u32) -> f64 {
    (0.9 - 0.12 * f64::from(k)).max(0.3)
}

pub fn hybrid_confidence(k: u32) -> f64 {
    (0.95 - 0.1 * f64::from(k)).max(0.4)
}
