//! Core data model for balloon tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single position report from the upstream feed. Carries no identity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawObservation {
    pub lat: f64,
    pub lon: f64,
    pub alt_km: f64,
}

impl RawObservation {
    pub fn new(lat: f64, lon: f64, alt_km: f64) -> Self {
        Self { lat, lon, alt_km }
    }

    /// Validity gates for untrusted feed records.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && self.alt_km.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
            && self.alt_km > 0.0
            && self.alt_km < 50.0
    }
}

/// All observations at one hour timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub hour_ts: DateTime<Utc>,
    pub observations: Vec<RawObservation>,
}

/// Summary row for snapshot listings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub hour_ts: DateTime<Utc>,
    pub observation_count: usize,
}

/// Lifecycle status of a tracked balloon position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BalloonStatus {
    Active,
    New,
    Lost,
}

impl BalloonStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BalloonStatus::Active => "active",
            BalloonStatus::New => "new",
            BalloonStatus::Lost => "lost",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(BalloonStatus::Active),
            "new" => Some(BalloonStatus::New),
            "lost" => Some(BalloonStatus::Lost),
            _ => None,
        }
    }
}

/// An observation that has been assigned a persistent balloon id.
///
/// Primary key is `(balloon_id, ts)`. Speed and heading describe the segment
/// from the immediately preceding position of the same id and are absent for
/// an id's first position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedPosition {
    pub balloon_id: String,
    pub ts: DateTime<Utc>,
    pub lat: f64,
    pub lon: f64,
    pub alt_km: f64,
    pub speed_kmh: Option<f64>,
    pub heading_deg: Option<f64>,
    pub status: BalloonStatus,
    pub confidence: f64,
}

/// An upper-air wind sample bound to a location, altitude and hour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindVector {
    pub lat: f64,
    pub lon: f64,
    pub alt_km: f64,
    pub pressure_hpa: u32,
    /// Eastward component, m/s (direction the wind is blowing toward).
    pub u_ms: f64,
    /// Northward component, m/s.
    pub v_ms: f64,
    pub speed_kmh: f64,
    /// Meteorological "from" bearing, degrees.
    pub direction_deg_from: f64,
    pub hour_ts: DateTime<Utc>,
}

/// Prediction model selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionMethod {
    Persistence,
    Wind,
    Hybrid,
}

impl PredictionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PredictionMethod::Persistence => "persistence",
            PredictionMethod::Wind => "wind",
            PredictionMethod::Hybrid => "hybrid",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "persistence" => Some(PredictionMethod::Persistence),
            "wind" => Some(PredictionMethod::Wind),
            "hybrid" => Some(PredictionMethod::Hybrid),
            _ => None,
        }
    }
}

/// A forecast position. Never persisted; recomputed on request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictedPosition {
    pub lat: f64,
    pub lon: f64,
    pub alt_km: f64,
    pub ts: DateTime<Utc>,
    pub confidence: f64,
    /// Model that produced this point ("persistence", "wind", "hybrid",
    /// or "persistence_fallback" when wind data was missing).
    pub method: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observation_validity() {
        assert!(RawObservation::new(45.0, -120.0, 18.5).is_valid());
        assert!(!RawObservation::new(91.0, 0.0, 18.5).is_valid());
        assert!(!RawObservation::new(0.0, 181.0, 18.5).is_valid());
        assert!(!RawObservation::new(0.0, 0.0, 0.0).is_valid());
        assert!(!RawObservation::new(0.0, 0.0, 200.0).is_valid());
        assert!(!RawObservation::new(f64::NAN, 0.0, 18.5).is_valid());
        assert!(!RawObservation::new(0.0, f64::INFINITY, 18.5).is_valid());
    }

    #[test]
    fn test_status_roundtrip() {
        for status in [BalloonStatus::Active, BalloonStatus::New, BalloonStatus::Lost] {
            assert_eq!(BalloonStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(BalloonStatus::parse("gone"), None);
    }

    #[test]
    fn test_method_parse() {
        assert_eq!(PredictionMethod::parse("hybrid"), Some(PredictionMethod::Hybrid));
        assert_eq!(PredictionMethod::parse("ballistic"), None);
    }
}
