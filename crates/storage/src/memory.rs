//! In-memory track store.
//!
//! Contract-identical to the PostgreSQL store. Backs controller and service
//! tests and `--store memory` local runs.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use strato_common::{RawObservation, Snapshot, SnapshotMeta, TrackResult, TrackedPosition};

use crate::store::TrackStore;

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    snapshots: BTreeMap<DateTime<Utc>, Vec<RawObservation>>,
    tracked: BTreeMap<(String, DateTime<Utc>), TrackedPosition>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TrackStore for MemoryStore {
    async fn put_snapshot(
        &self,
        hour_ts: DateTime<Utc>,
        observations: &[RawObservation],
    ) -> TrackResult<()> {
        let mut inner = self.inner.write().await;
        inner.snapshots.insert(hour_ts, observations.to_vec());
        Ok(())
    }

    async fn get_snapshot(&self, hour_ts: DateTime<Utc>) -> TrackResult<Option<Snapshot>> {
        let inner = self.inner.read().await;
        Ok(inner.snapshots.get(&hour_ts).map(|observations| Snapshot {
            hour_ts,
            observations: observations.clone(),
        }))
    }

    async fn latest_snapshot_time(&self) -> TrackResult<Option<DateTime<Utc>>> {
        let inner = self.inner.read().await;
        Ok(inner.snapshots.keys().next_back().copied())
    }

    async fn list_snapshots(&self) -> TrackResult<Vec<SnapshotMeta>> {
        let inner = self.inner.read().await;
        Ok(inner
            .snapshots
            .iter()
            .rev()
            .map(|(ts, obs)| SnapshotMeta { hour_ts: *ts, observation_count: obs.len() })
            .collect())
    }

    async fn put_tracked(&self, batch: &[TrackedPosition]) -> TrackResult<()> {
        let mut inner = self.inner.write().await;
        for pos in batch {
            inner
                .tracked
                .insert((pos.balloon_id.clone(), pos.ts), pos.clone());
        }
        Ok(())
    }

    async fn tracked_at(&self, ts: DateTime<Utc>) -> TrackResult<Vec<TrackedPosition>> {
        let inner = self.inner.read().await;
        Ok(inner
            .tracked
            .values()
            .filter(|pos| pos.ts == ts)
            .cloned()
            .collect())
    }

    async fn trajectory(&self, balloon_id: &str) -> TrackResult<Vec<TrackedPosition>> {
        let inner = self.inner.read().await;
        Ok(inner
            .tracked
            .range(
                (balloon_id.to_string(), DateTime::<Utc>::MIN_UTC)
                    ..=(balloon_id.to_string(), DateTime::<Utc>::MAX_UTC),
            )
            .map(|(_, pos)| pos.clone())
            .collect())
    }

    async fn all_trajectories(&self) -> TrackResult<Vec<(String, Vec<TrackedPosition>)>> {
        let inner = self.inner.read().await;
        let mut trajectories: Vec<(String, Vec<TrackedPosition>)> = Vec::new();
        for ((id, _), pos) in inner.tracked.iter() {
            match trajectories.last_mut() {
                Some((last_id, positions)) if last_id == id => positions.push(pos.clone()),
                _ => trajectories.push((id.clone(), vec![pos.clone()])),
            }
        }
        Ok(trajectories)
    }

    async fn max_numeric_id(&self) -> TrackResult<Option<u64>> {
        let inner = self.inner.read().await;
        Ok(inner
            .tracked
            .keys()
            .filter_map(|(id, _)| id.strip_prefix("balloon_"))
            .filter_map(|suffix| suffix.parse::<u64>().ok())
            .max())
    }

    async fn cleanup(&self, older_than: DateTime<Utc>) -> TrackResult<(u64, u64)> {
        let mut inner = self.inner.write().await;

        let tracked_before = inner.tracked.len();
        inner.tracked.retain(|(_, ts), _| *ts >= older_than);
        let tracked_deleted = (tracked_before - inner.tracked.len()) as u64;

        let snapshots_before = inner.snapshots.len();
        inner.snapshots.retain(|ts, _| *ts >= older_than);
        let snapshots_deleted = (snapshots_before - inner.snapshots.len()) as u64;

        Ok((tracked_deleted, snapshots_deleted))
    }

    async fn clear_all(&self) -> TrackResult<()> {
        let mut inner = self.inner.write().await;
        inner.snapshots.clear();
        inner.tracked.clear();
        Ok(())
    }
}
