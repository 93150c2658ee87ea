//! Match-cost model between a current observation and a previous balloon.
//!
//! Hard gates reject with infinite cost; soft costs land in a 0..100 range
//! weighted toward motion continuity (heading dominates, then altitude).

use strato_common::geo::{bearing_deg, haversine_km, heading_delta_deg, project_forward};
use strato_common::{RawObservation, TrackedPosition, Velocity};

/// Hard gate: maximum plausible horizontal drift between hourly snapshots.
pub const MAX_DISTANCE_PER_HOUR_KM: f64 = 600.0;
/// Hard gate: maximum plausible altitude change between hourly snapshots.
pub const MAX_ALT_DELTA_KM: f64 = 10.0;
/// Hard gate: maximum implied heading change when the balloon is moving.
pub const MAX_DIR_CHANGE_DEG: f64 = 45.0;
/// Typical hourly drift, used to normalize the distance term.
pub const TYPICAL_DRIFT_KM: f64 = 150.0;
/// Below this speed headings are noise; the heading terms are skipped.
pub const HEADING_SPEED_FLOOR_KMH: f64 = 10.0;

/// Greedy phase acceptance ceiling.
pub const GREEDY_COST_MAX: f64 = 30.0;
/// Greedy phase additionally requires a tight altitude match.
pub const GREEDY_ALT_DELTA_MAX_KM: f64 = 5.0;
/// Assignment phase acceptance ceiling.
pub const ASSIGN_COST_MAX: f64 = 70.0;

const W_DISTANCE: f64 = 0.15;
const W_HEADING: f64 = 0.55;
const W_SPEED: f64 = 0.10;
const W_ALTITUDE: f64 = 0.20;

/// Cost of matching `curr` to `prev`, given the balloon's resolved velocity
/// (smoothed history, falling back to the previous segment). `f64::INFINITY`
/// when a hard gate rejects the pair.
pub fn candidate_cost(
    curr: &RawObservation,
    prev: &TrackedPosition,
    velocity: Option<Velocity>,
) -> f64 {
    let distance = haversine_km(prev.lat, prev.lon, curr.lat, curr.lon);
    if distance > MAX_DISTANCE_PER_HOUR_KM {
        return f64::INFINITY;
    }

    let alt_delta = (curr.alt_km - prev.alt_km).abs();
    if alt_delta > MAX_ALT_DELTA_KM {
        return f64::INFINITY;
    }

    let moving = distance > 1e-6;
    let implied_heading = if moving {
        Some(bearing_deg(prev.lat, prev.lon, curr.lat, curr.lon))
    } else {
        None
    };

    let mut heading_term = 0.0;
    if let (Some(v), Some(implied)) = (velocity, implied_heading) {
        if v.speed_kmh > HEADING_SPEED_FLOOR_KMH {
            let delta = heading_delta_deg(implied, v.heading_deg);
            if delta > MAX_DIR_CHANGE_DEG {
                return f64::INFINITY;
            }
            heading_term = (delta / MAX_DIR_CHANGE_DEG).powi(3);
        }
    }

    // Distance from where the balloon was expected to be after one hour.
    let d_pred = match velocity {
        Some(v) => {
            let (pred_lat, pred_lon) =
                project_forward(prev.lat, prev.lon, v.heading_deg, v.speed_kmh);
            haversine_km(pred_lat, pred_lon, curr.lat, curr.lon)
        }
        None => distance,
    };
    let distance_term = (d_pred / TYPICAL_DRIFT_KM).clamp(0.0, 1.0).powi(2);

    let speed_term = match velocity {
        Some(v) if v.speed_kmh > 1e-6 && distance > 1e-6 => {
            ((distance / v.speed_kmh).ln().abs() / 4.0_f64.ln()).min(1.0)
        }
        _ => 0.0,
    };

    let altitude_term = (alt_delta / MAX_ALT_DELTA_KM).powi(2);

    100.0
        * (W_DISTANCE * distance_term
            + W_HEADING * heading_term
            + W_SPEED * speed_term
            + W_ALTITUDE * altitude_term)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use strato_common::geo::project_forward;
    use strato_common::BalloonStatus;

    fn prev(lat: f64, lon: f64, alt: f64, speed: Option<f64>, heading: Option<f64>) -> TrackedPosition {
        TrackedPosition {
            balloon_id: "balloon_0001".to_string(),
            ts: Utc.with_ymd_and_hms(2025, 6, 1, 11, 0, 0).unwrap(),
            lat,
            lon,
            alt_km: alt,
            speed_kmh: speed,
            heading_deg: heading,
            status: BalloonStatus::Active,
            confidence: 0.9,
        }
    }

    #[test]
    fn test_distance_gate() {
        let p = prev(0.0, 0.0, 18.0, None, None);
        let far = RawObservation::new(0.0, 6.0, 18.0); // ~667 km
        assert!(candidate_cost(&far, &p, None).is_infinite());

        let near = RawObservation::new(0.0, 1.0, 18.0);
        assert!(candidate_cost(&near, &p, None).is_finite());
    }

    #[test]
    fn test_altitude_gate() {
        let p = prev(0.0, 0.0, 18.0, None, None);
        let jumped = RawObservation::new(0.1, 0.1, 29.0);
        assert!(candidate_cost(&jumped, &p, None).is_infinite());
    }

    #[test]
    fn test_heading_gate_when_moving() {
        let p = prev(0.0, 0.0, 18.0, Some(100.0), Some(90.0));
        let velocity = Some(Velocity::new(100.0, 90.0));

        // Continuation east is cheap.
        let ahead = RawObservation::new(0.0, 0.9, 18.0);
        assert!(candidate_cost(&ahead, &p, velocity).is_finite());

        // Reversal west is gated.
        let behind = RawObservation::new(0.0, -0.9, 18.0);
        assert!(candidate_cost(&behind, &p, velocity).is_infinite());
    }

    #[test]
    fn test_no_heading_gate_for_slow_balloons() {
        let velocity = Some(Velocity::new(5.0, 90.0));
        let p = prev(0.0, 0.0, 18.0, Some(5.0), Some(90.0));
        // Moving opposite the recorded heading, but well below the speed floor.
        let behind = RawObservation::new(0.0, -0.2, 18.0);
        assert!(candidate_cost(&behind, &p, velocity).is_finite());
    }

    #[test]
    fn test_perfect_continuation_is_cheap() {
        let p = prev(10.0, 20.0, 18.0, Some(120.0), Some(45.0));
        let velocity = Some(Velocity::new(120.0, 45.0));
        let (lat, lon) = project_forward(10.0, 20.0, 45.0, 120.0);
        let curr = RawObservation::new(lat, lon, 18.0);

        let cost = candidate_cost(&curr, &p, velocity);
        assert!(cost < 1.0, "got {}", cost);
    }

    #[test]
    fn test_cost_orders_candidates_by_continuity() {
        let p = prev(0.0, 0.0, 18.0, Some(100.0), Some(90.0));
        let velocity = Some(Velocity::new(100.0, 90.0));

        let on_track = RawObservation::new(0.0, 0.9, 18.0);
        let off_heading = RawObservation::new(0.5, 0.75, 18.0); // ~34 degrees off
        let c1 = candidate_cost(&on_track, &p, velocity);
        let c2 = candidate_cost(&off_heading, &p, velocity);
        assert!(c1 < c2, "{} vs {}", c1, c2);
    }

    #[test]
    fn test_altitude_term_scales() {
        let p = prev(0.0, 0.0, 18.0, None, None);
        let same_alt = RawObservation::new(0.0, 0.9, 18.0);
        let alt_off = RawObservation::new(0.0, 0.9, 24.0);
        assert!(candidate_cost(&same_alt, &p, None) < candidate_cost(&alt_off, &p, None));
    }
}
