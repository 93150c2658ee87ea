//! The storage contract shared by the ingest controller, predictor and
//! query service.
//!
//! The controller is the only writer; every other component reads. All write
//! operations are idempotent upserts under their primary key, and `cleanup`
//! removes every row strictly older than the cutoff in one logical pass.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use strato_common::{RawObservation, Snapshot, SnapshotMeta, TrackResult, TrackedPosition};

#[async_trait]
pub trait TrackStore: Send + Sync {
    /// Idempotently upsert the raw snapshot for one hour.
    async fn put_snapshot(
        &self,
        hour_ts: DateTime<Utc>,
        observations: &[RawObservation],
    ) -> TrackResult<()>;

    async fn get_snapshot(&self, hour_ts: DateTime<Utc>) -> TrackResult<Option<Snapshot>>;

    /// The newest stored snapshot hour, if any.
    async fn latest_snapshot_time(&self) -> TrackResult<Option<DateTime<Utc>>>;

    /// All snapshot hours, newest first.
    async fn list_snapshots(&self) -> TrackResult<Vec<SnapshotMeta>>;

    /// Idempotently upsert a batch of tracked positions.
    async fn put_tracked(&self, batch: &[TrackedPosition]) -> TrackResult<()>;

    /// Every tracked position at exactly `ts`.
    async fn tracked_at(&self, ts: DateTime<Utc>) -> TrackResult<Vec<TrackedPosition>>;

    /// Full retained history for one id, oldest first.
    async fn trajectory(&self, balloon_id: &str) -> TrackResult<Vec<TrackedPosition>>;

    /// Every retained trajectory, oldest-first per id.
    async fn all_trajectories(&self) -> TrackResult<Vec<(String, Vec<TrackedPosition>)>>;

    /// Largest numeric suffix among stored `balloon_NNNN` ids.
    async fn max_numeric_id(&self) -> TrackResult<Option<u64>>;

    /// Delete every snapshot and tracked row with a timestamp strictly
    /// before `older_than`. Returns `(tracked_deleted, snapshots_deleted)`.
    async fn cleanup(&self, older_than: DateTime<Utc>) -> TrackResult<(u64, u64)>;

    /// Drop all stored data.
    async fn clear_all(&self) -> TrackResult<()>;
}
