//! Identity resolution across consecutive hourly snapshots.
//!
//! Pure logic. No I/O, no database. Given the current hour's raw
//! observations and the previous hour's tracked balloons, `track` preserves
//! ids for motion-continuity matches, retires unmatched balloons by simply
//! not re-emitting them, and mints fresh ids for unmatched observations.
//! The caller persists the output.

pub mod assignment;
pub mod cost;
pub mod spatial;

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use tracing::debug;

use strato_common::geo::{bearing_deg, haversine_km};
use strato_common::motion::smoothed_velocity;
use strato_common::{BalloonStatus, RawObservation, TrackedPosition, Velocity};

use assignment::SENTINEL_COST;
use cost::{
    candidate_cost, ASSIGN_COST_MAX, GREEDY_ALT_DELTA_MAX_KM, GREEDY_COST_MAX,
    MAX_DISTANCE_PER_HOUR_KM,
};

/// Pre-filter bounding-box half width: 1.5x the hard distance gate,
/// converted to degrees.
const QUERY_HALF_WIDTH_DEG: f64 = 1.5 * MAX_DISTANCE_PER_HOUR_KM / 111.0;

/// Per-id recent segment velocities, newest last, at most three entries.
pub type SegmentHistory = HashMap<String, VecDeque<Velocity>>;

/// Maximum retained segments per balloon.
pub const HISTORY_DEPTH: usize = 3;

/// Monotonic balloon id source. Ids are never reused; the floor is
/// rehydrated at startup from the largest persisted suffix.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    next: u64,
}

impl IdAllocator {
    pub fn new(floor: u64) -> Self {
        Self { next: floor }
    }

    pub fn next_id(&mut self) -> String {
        let id = format!("balloon_{:04}", self.next);
        self.next += 1;
        id
    }

    /// The suffix the next minted id will carry.
    pub fn peek(&self) -> u64 {
        self.next
    }
}

/// Resolve identities for one hour.
///
/// `history` supplies up to three recent segment velocities per id for the
/// smoothed-velocity projection; ids absent from it fall back to the
/// velocity recorded on their previous position.
pub fn track(
    ts: DateTime<Utc>,
    current: &[RawObservation],
    prev: &[TrackedPosition],
    history: &SegmentHistory,
    ids: &mut IdAllocator,
) -> Vec<TrackedPosition> {
    // First hour ever: everything is new and fully trusted.
    if prev.is_empty() {
        return current
            .iter()
            .map(|obs| mint_new(obs, ts, ids, 1.0))
            .collect();
    }

    let velocities: Vec<Option<Velocity>> = prev.iter().map(|p| resolve_velocity(p, history)).collect();

    let index = spatial::GridIndex::build(prev.iter().map(|p| (p.lat, p.lon)));

    // Sparse candidate costs per current observation.
    let candidates: Vec<Vec<(usize, f64)>> = current
        .iter()
        .map(|obs| {
            let mut list: Vec<(usize, f64)> = index
                .query(obs.lat, obs.lon, QUERY_HALF_WIDTH_DEG)
                .into_iter()
                .filter_map(|j| {
                    let c = candidate_cost(obs, &prev[j], velocities[j]);
                    c.is_finite().then_some((j, c))
                })
                .collect();
            list.sort_by(|a, b| a.1.total_cmp(&b.1));
            list
        })
        .collect();

    let mut matched_prev = vec![false; prev.len()];
    let mut matches: Vec<Option<(usize, f64)>> = vec![None; current.len()];

    // Greedy phase: commit cheap, uncontested, altitude-tight best matches.
    let mut best_claims: HashMap<usize, usize> = HashMap::new();
    for list in &candidates {
        if let Some(&(j, _)) = list.first() {
            *best_claims.entry(j).or_insert(0) += 1;
        }
    }
    for (i, list) in candidates.iter().enumerate() {
        let Some(&(j, cost)) = list.first() else { continue };
        let uncontested = best_claims.get(&j).copied().unwrap_or(0) == 1;
        let alt_delta = (current[i].alt_km - prev[j].alt_km).abs();
        if cost < GREEDY_COST_MAX && uncontested && alt_delta < GREEDY_ALT_DELTA_MAX_KM {
            matches[i] = Some((j, cost));
            matched_prev[j] = true;
        }
    }

    // Assignment phase over everything still open.
    let deferred: Vec<usize> = (0..current.len())
        .filter(|&i| {
            matches[i].is_none()
                && candidates[i].iter().any(|&(j, _)| !matched_prev[j])
        })
        .collect();
    let open_prev: Vec<usize> = {
        let mut seen = vec![false; prev.len()];
        for &i in &deferred {
            for &(j, _) in &candidates[i] {
                if !matched_prev[j] {
                    seen[j] = true;
                }
            }
        }
        (0..prev.len()).filter(|&j| seen[j]).collect()
    };

    if !deferred.is_empty() && !open_prev.is_empty() {
        let n = deferred.len().max(open_prev.len());
        let mut matrix = vec![vec![SENTINEL_COST; n]; n];
        let col_of: HashMap<usize, usize> =
            open_prev.iter().enumerate().map(|(c, &j)| (j, c)).collect();

        for (r, &i) in deferred.iter().enumerate() {
            for &(j, cost) in &candidates[i] {
                if let Some(&c) = col_of.get(&j) {
                    matrix[r][c] = cost;
                }
            }
        }

        let assignment = assignment::solve(&matrix);
        for (r, &i) in deferred.iter().enumerate() {
            let c = assignment[r];
            if c < open_prev.len() {
                let cost = matrix[r][c];
                if cost < ASSIGN_COST_MAX {
                    let j = open_prev[c];
                    matches[i] = Some((j, cost));
                    matched_prev[j] = true;
                }
            }
        }
    }

    let mut output = Vec::with_capacity(current.len());
    let mut continued = 0usize;
    for (i, obs) in current.iter().enumerate() {
        match matches[i] {
            Some((j, cost)) => {
                output.push(continue_track(obs, &prev[j], ts, cost));
                continued += 1;
            }
            None => output.push(mint_new(obs, ts, ids, 0.5)),
        }
    }

    debug!(
        current = current.len(),
        previous = prev.len(),
        continued = continued,
        minted = current.len() - continued,
        "Resolved hour"
    );

    output
}

/// Append one hour's output segments to the history map, replacing entries
/// for ids that were not re-emitted. The result only describes balloons
/// still alive at this hour.
pub fn advance_history(history: &SegmentHistory, tracked: &[TrackedPosition]) -> SegmentHistory {
    let mut next = SegmentHistory::with_capacity(tracked.len());
    for pos in tracked {
        let mut segments = history.get(&pos.balloon_id).cloned().unwrap_or_default();
        if let (Some(speed), Some(heading)) = (pos.speed_kmh, pos.heading_deg) {
            segments.push_back(Velocity::new(speed, heading));
            while segments.len() > HISTORY_DEPTH {
                segments.pop_front();
            }
        }
        next.insert(pos.balloon_id.clone(), segments);
    }
    next
}

/// Rebuild the history map from stored trajectories (bootstrap path).
pub fn history_from_trajectories(trajectories: &[(String, Vec<TrackedPosition>)]) -> SegmentHistory {
    let mut history = SegmentHistory::new();
    for (id, positions) in trajectories {
        let mut segments: VecDeque<Velocity> = positions
            .iter()
            .filter_map(|p| match (p.speed_kmh, p.heading_deg) {
                (Some(s), Some(h)) => Some(Velocity::new(s, h)),
                _ => None,
            })
            .collect();
        while segments.len() > HISTORY_DEPTH {
            segments.pop_front();
        }
        history.insert(id.clone(), segments);
    }
    history
}

fn resolve_velocity(prev: &TrackedPosition, history: &SegmentHistory) -> Option<Velocity> {
    history
        .get(&prev.balloon_id)
        .map(|segments| segments.iter().copied().collect::<Vec<_>>())
        .and_then(|segments| smoothed_velocity(&segments))
        .or(match (prev.speed_kmh, prev.heading_deg) {
            (Some(speed), Some(heading)) => Some(Velocity::new(speed, heading)),
            _ => None,
        })
}

fn continue_track(
    obs: &RawObservation,
    prev: &TrackedPosition,
    ts: DateTime<Utc>,
    cost: f64,
) -> TrackedPosition {
    let distance = haversine_km(prev.lat, prev.lon, obs.lat, obs.lon);
    let elapsed_hours = {
        let h = (ts - prev.ts).num_seconds() as f64 / 3600.0;
        if h > 0.0 {
            h
        } else {
            1.0
        }
    };
    let speed = distance / elapsed_hours;
    let heading = if distance > 1e-6 {
        Some(bearing_deg(prev.lat, prev.lon, obs.lat, obs.lon))
    } else {
        prev.heading_deg
    };

    TrackedPosition {
        balloon_id: prev.balloon_id.clone(),
        ts,
        lat: obs.lat,
        lon: obs.lon,
        alt_km: obs.alt_km,
        speed_kmh: Some(speed),
        heading_deg: heading,
        status: BalloonStatus::Active,
        confidence: (-2.0 * cost / 100.0).exp().max(0.3),
    }
}

fn mint_new(
    obs: &RawObservation,
    ts: DateTime<Utc>,
    ids: &mut IdAllocator,
    confidence: f64,
) -> TrackedPosition {
    TrackedPosition {
        balloon_id: ids.next_id(),
        ts,
        lat: obs.lat,
        lon: obs.lon,
        alt_km: obs.alt_km,
        speed_kmh: None,
        heading_deg: None,
        status: BalloonStatus::New,
        confidence,
    }
}
