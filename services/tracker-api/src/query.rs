//! Read-side query service.
//!
//! Thin over the store. Hour offsets are always recomputed against the
//! current wall clock at read time, never trusted from stored state.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use storage::TrackStore;
use strato_common::time::{hour_at_offset, now_hour};
use strato_common::{TrackError, TrackResult, TrackedPosition};

/// Data age (minutes) below which the service is healthy.
const HEALTHY_AGE_MINUTES: i64 = 65;
/// Data age (minutes) up to which the service is degraded rather than down.
const DEGRADED_AGE_MINUTES: i64 = 90;

/// A trajectory split around the caller's reference hour. The position at
/// the reference hour itself appears in both halves so plotted lines
/// connect seamlessly.
#[derive(Debug, Clone, Serialize)]
pub struct TrajectoryView {
    pub balloon_id: String,
    pub historical_positions: Vec<TrackedPosition>,
    pub future_positions: Vec<TrackedPosition>,
    pub reference_hour_offset: u32,
}

/// Health report derived purely from data age.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub updated_at: Option<DateTime<Utc>>,
    pub data_age_minutes: Option<i64>,
    pub balloon_count: usize,
}

pub struct QueryService {
    store: Arc<dyn TrackStore>,
}

impl QueryService {
    pub fn new(store: Arc<dyn TrackStore>) -> Self {
        Self { store }
    }

    /// All tracked positions at `now_hour - hour_offset`.
    pub async fn positions_at(
        &self,
        hour_offset: u32,
    ) -> TrackResult<(DateTime<Utc>, Vec<TrackedPosition>)> {
        if hour_offset > 23 {
            return Err(TrackError::InvalidArgument(format!(
                "hour_offset {} out of range [0,23]",
                hour_offset
            )));
        }
        let hour = hour_at_offset(now_hour(), hour_offset);
        let positions = self.store.tracked_at(hour).await?;
        Ok((hour, positions))
    }

    /// Full stored trajectory for one balloon.
    pub async fn trajectory(&self, balloon_id: &str) -> TrackResult<Vec<TrackedPosition>> {
        let trajectory = self.store.trajectory(balloon_id).await?;
        if trajectory.is_empty() {
            return Err(TrackError::NotFound(format!("balloon {}", balloon_id)));
        }
        Ok(trajectory)
    }

    /// Trajectory partitioned around a reference hour offset.
    pub async fn trajectory_partitioned(
        &self,
        balloon_id: &str,
        reference_offset: u32,
    ) -> TrackResult<TrajectoryView> {
        if reference_offset > 23 {
            return Err(TrackError::InvalidArgument(format!(
                "hour_offset {} out of range [0,23]",
                reference_offset
            )));
        }

        let trajectory = self.trajectory(balloon_id).await?;
        let reference = hour_at_offset(now_hour(), reference_offset);

        let historical_positions: Vec<TrackedPosition> =
            trajectory.iter().filter(|p| p.ts <= reference).cloned().collect();
        let future_positions: Vec<TrackedPosition> =
            trajectory.iter().filter(|p| p.ts >= reference).cloned().collect();

        Ok(TrajectoryView {
            balloon_id: balloon_id.to_string(),
            historical_positions,
            future_positions,
            reference_hour_offset: reference_offset,
        })
    }

    /// Health derived from data age alone.
    pub async fn health(&self) -> TrackResult<HealthReport> {
        let updated_at = self.store.latest_snapshot_time().await?;
        let now = Utc::now();

        let data_age_minutes = updated_at.map(|t| (now - t).num_minutes());
        let status = match data_age_minutes {
            Some(age) if age < HEALTHY_AGE_MINUTES => "healthy",
            Some(age) if age <= DEGRADED_AGE_MINUTES => "degraded",
            _ => "unhealthy",
        };

        let balloon_count = match updated_at {
            Some(t) => self.store.tracked_at(t).await?.len(),
            None => 0,
        };

        Ok(HealthReport { status, updated_at, data_age_minutes, balloon_count })
    }

    /// Minutes since the newest snapshot, for list responses.
    pub async fn data_age(&self) -> TrackResult<(Option<DateTime<Utc>>, Option<i64>)> {
        let updated_at = self.store.latest_snapshot_time().await?;
        let age = updated_at.map(|t| (Utc::now() - t).num_minutes());
        Ok((updated_at, age))
    }

    /// Lightweight per-balloon trails for bulk time-slider scrubbing.
    pub async fn history_trails(&self) -> TrackResult<Vec<BalloonTrail>> {
        let trajectories = self.store.all_trajectories().await?;
        Ok(trajectories
            .into_iter()
            .map(|(id, positions)| BalloonTrail {
                id,
                trail: positions
                    .iter()
                    .map(|p| (p.lat, p.lon, p.alt_km, p.ts.to_rfc3339()))
                    .collect(),
            })
            .collect())
    }
}

/// One balloon's compact trail.
#[derive(Debug, Clone, Serialize)]
pub struct BalloonTrail {
    pub id: String,
    pub trail: Vec<(f64, f64, f64, String)>,
}
