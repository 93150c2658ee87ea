//! Controller state-machine behavior against a scripted feed and the
//! in-memory store.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use feed::{BalloonFeed, FetchOutcome};
use ingest::{IngestController, Phase};
use storage::{MemoryStore, TrackStore};
use strato_common::geo::project_forward;
use strato_common::{BalloonStatus, RawObservation, TrackError, TrackResult, TrackedPosition};

fn anchor_hour() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 23, 0, 0).unwrap()
}

/// Feed scripted by absolute hour. Unscripted hours come back empty with a
/// recorded failure, exactly like a dead upstream.
struct ScriptedFeed {
    anchor: StdMutex<DateTime<Utc>>,
    by_hour: StdMutex<HashMap<DateTime<Utc>, FetchOutcome>>,
}

impl ScriptedFeed {
    fn new(anchor: DateTime<Utc>) -> Self {
        Self {
            anchor: StdMutex::new(anchor),
            by_hour: StdMutex::new(HashMap::new()),
        }
    }

    fn set_anchor(&self, anchor: DateTime<Utc>) {
        *self.anchor.lock().unwrap() = anchor;
    }

    fn script(&self, hour: DateTime<Utc>, observations: Vec<RawObservation>) {
        self.by_hour.lock().unwrap().insert(
            hour,
            FetchOutcome { observations, dropped: 0, failure: None },
        );
    }

    fn script_with_dropped(&self, hour: DateTime<Utc>, observations: Vec<RawObservation>, dropped: usize) {
        self.by_hour.lock().unwrap().insert(
            hour,
            FetchOutcome { observations, dropped, failure: None },
        );
    }
}

#[async_trait]
impl BalloonFeed for ScriptedFeed {
    async fn fetch_hour(&self, offset: u32) -> TrackResult<FetchOutcome> {
        let anchor = *self.anchor.lock().unwrap();
        let hour = anchor - Duration::hours(i64::from(offset));
        Ok(self
            .by_hour
            .lock()
            .unwrap()
            .get(&hour)
            .cloned()
            .unwrap_or(FetchOutcome {
                observations: Vec::new(),
                dropped: 0,
                failure: Some("unscripted hour".to_string()),
            }))
    }
}

/// Three balloons drifting steadily east at 100 km/h.
fn constellation(hours_elapsed: i64) -> Vec<RawObservation> {
    let bases = [(0.0, 0.0, 18.0), (20.0, 30.0, 16.0), (40.0, -60.0, 12.0)];
    bases
        .iter()
        .map(|&(lat, lon, alt)| {
            let (nlat, nlon) = project_forward(lat, lon, 90.0, 100.0 * hours_elapsed as f64);
            RawObservation::new(nlat, nlon, alt)
        })
        .collect()
}

/// Script the full 24-hour window ending at `anchor`.
fn script_window(feed: &ScriptedFeed, anchor: DateTime<Utc>) {
    for offset in 0..24i64 {
        let hour = anchor - Duration::hours(offset);
        feed.script(hour, constellation(23 - offset));
    }
}

fn setup() -> (Arc<MemoryStore>, Arc<ScriptedFeed>, IngestController) {
    let store = Arc::new(MemoryStore::new());
    let feed = Arc::new(ScriptedFeed::new(anchor_hour()));
    let controller = IngestController::new(
        Arc::clone(&store) as Arc<dyn TrackStore>,
        Arc::clone(&feed) as Arc<dyn BalloonFeed>,
    );
    (store, feed, controller)
}

#[tokio::test]
async fn cold_start_rebuilds_the_full_window() {
    let (store, feed, controller) = setup();
    script_window(&feed, anchor_hour());

    let report = controller.trigger_at(anchor_hour()).await.unwrap();

    assert!(report.rebuilt);
    assert_eq!(report.hours_ingested, 24);
    assert_eq!(report.balloons_tracked, 3);
    assert_eq!(controller.phase().await, Phase::Steady);

    // Every hour of the window is populated.
    for offset in 0..24i64 {
        let hour = anchor_hour() - Duration::hours(offset);
        let tracked = store.tracked_at(hour).await.unwrap();
        assert_eq!(tracked.len(), 3, "hour {} not populated", hour);
    }

    // Smooth drift kept identities across all 24 hours.
    let trajectory = store.trajectory("balloon_0000").await.unwrap();
    assert_eq!(trajectory.len(), 24);
    assert_eq!(report.new_ids, 3);
}

#[tokio::test]
async fn second_trigger_in_same_hour_is_a_no_op() {
    let (store, feed, controller) = setup();
    script_window(&feed, anchor_hour());

    controller.trigger_at(anchor_hour()).await.unwrap();
    let snapshots_before = store.list_snapshots().await.unwrap();
    let tracked_before = store.tracked_at(anchor_hour()).await.unwrap();

    let report = controller.trigger_at(anchor_hour()).await.unwrap();
    assert!(report.no_op);

    let snapshots_after = store.list_snapshots().await.unwrap();
    let tracked_after = store.tracked_at(anchor_hour()).await.unwrap();
    assert_eq!(snapshots_before.len(), snapshots_after.len());
    assert_eq!(tracked_before, tracked_after);
}

#[tokio::test]
async fn incremental_hour_preserves_ids_and_mints_for_jumps() {
    let (store, feed, controller) = setup();
    script_window(&feed, anchor_hour());
    controller.trigger_at(anchor_hour()).await.unwrap();

    let previous: Vec<TrackedPosition> = store.tracked_at(anchor_hour()).await.unwrap();

    // Next hour: first two continue their drift, the third jumps ~800 km.
    let next_hour = anchor_hour() + Duration::hours(1);
    let mut next_obs = constellation(24);
    let jumped = project_forward(next_obs[2].lat, next_obs[2].lon, 0.0, 800.0);
    next_obs[2] = RawObservation::new(jumped.0, jumped.1, next_obs[2].alt_km);

    feed.set_anchor(next_hour);
    feed.script(next_hour, next_obs);

    let report = controller.trigger_at(next_hour).await.unwrap();
    assert!(!report.rebuilt);
    assert_eq!(report.hours_ingested, 1);

    let current = store.tracked_at(next_hour).await.unwrap();
    assert_eq!(current.len(), 3);

    let minted: Vec<_> = current.iter().filter(|p| p.status == BalloonStatus::New).collect();
    assert_eq!(minted.len(), 1);

    // The jumped balloon's old id was not re-emitted this hour, but its
    // previous row is still in the store.
    let old_id = &previous[2].balloon_id;
    assert!(current.iter().all(|p| &p.balloon_id != old_id));
    assert_eq!(store.trajectory(old_id).await.unwrap().last().unwrap().ts, anchor_hour());

    // The continuing balloons kept their ids.
    for p in &previous[..2] {
        assert!(current.iter().any(|c| c.balloon_id == p.balloon_id
            && c.status == BalloonStatus::Active));
    }
}

#[tokio::test]
async fn rolling_window_holds_after_ticks() {
    let (store, feed, controller) = setup();
    script_window(&feed, anchor_hour());
    controller.trigger_at(anchor_hour()).await.unwrap();

    let next_hour = anchor_hour() + Duration::hours(1);
    feed.set_anchor(next_hour);
    feed.script(next_hour, constellation(24));

    let report = controller.trigger_at(next_hour).await.unwrap();
    assert_eq!(report.snapshots_deleted, 1);

    let snapshots = store.list_snapshots().await.unwrap();
    let oldest = snapshots.last().unwrap().hour_ts;
    let newest = snapshots.first().unwrap().hour_ts;
    assert!(oldest >= next_hour - Duration::hours(23));
    assert_eq!(newest, next_hour);
    assert_eq!(store.latest_snapshot_time().await.unwrap(), Some(next_hour));
}

#[tokio::test]
async fn empty_current_hour_falls_back_to_rebuild() {
    let (_store, feed, controller) = setup();
    script_window(&feed, anchor_hour());
    controller.trigger_at(anchor_hour()).await.unwrap();

    // Next hour is not scripted: the feed returns empty.
    let next_hour = anchor_hour() + Duration::hours(1);
    feed.set_anchor(next_hour);

    let report = controller.trigger_at(next_hour).await.unwrap();
    assert!(report.rebuilt);
    // The 23 still-scripted hours were re-ingested; the dead hour skipped.
    assert_eq!(report.hours_ingested, 23);
    assert_eq!(controller.phase().await, Phase::Steady);
}

#[tokio::test]
async fn bootstrap_rejects_empty_snapshot_state() {
    let (store, feed, controller) = setup();

    // A present-but-empty snapshot at the current hour is not a usable
    // window; the controller must rebuild.
    store.put_snapshot(anchor_hour(), &[]).await.unwrap();
    script_window(&feed, anchor_hour());

    let report = controller.trigger_at(anchor_hour()).await.unwrap();
    assert!(report.rebuilt);
    assert_eq!(store.tracked_at(anchor_hour()).await.unwrap().len(), 3);
}

#[tokio::test]
async fn bootstrap_fills_gap_from_recent_state() {
    let (store, feed, controller) = setup();
    script_window(&feed, anchor_hour());
    controller.trigger_at(anchor_hour()).await.unwrap();

    // A fresh controller over the same store, three hours later.
    let later = anchor_hour() + Duration::hours(3);
    feed.set_anchor(later);
    for back in 0..3i64 {
        feed.script(later - Duration::hours(back), constellation(24 + 2 - back));
    }

    let controller2 = IngestController::new(
        Arc::clone(&store) as Arc<dyn TrackStore>,
        Arc::clone(&feed) as Arc<dyn BalloonFeed>,
    );

    let report = controller2.trigger_at(later).await.unwrap();
    assert!(!report.rebuilt);
    assert_eq!(report.hours_ingested, 3);

    // Identity survived the process restart.
    let trajectory = store.trajectory("balloon_0000").await.unwrap();
    assert_eq!(trajectory.last().unwrap().ts, later);
    assert_eq!(trajectory.len(), 24 + 3 - 3); // window trimmed to 24 hours
}

#[tokio::test]
async fn id_counter_rehydrates_above_persisted_ids() {
    let (store, feed, controller) = setup();

    // Persist a balloon with a high suffix, then cold start.
    store
        .put_tracked(&[TrackedPosition {
            balloon_id: "balloon_7041".to_string(),
            ts: anchor_hour() - Duration::hours(30),
            lat: 0.0,
            lon: 0.0,
            alt_km: 18.0,
            speed_kmh: None,
            heading_deg: None,
            status: BalloonStatus::New,
            confidence: 1.0,
        }])
        .await
        .unwrap();

    script_window(&feed, anchor_hour());
    controller.trigger_at(anchor_hour()).await.unwrap();

    let max = store.max_numeric_id().await.unwrap().unwrap();
    assert!(max >= 7042, "new ids must mint above the persisted floor, got {}", max);
}

#[tokio::test]
async fn dropped_record_counts_surface_in_report() {
    let (_store, feed, controller) = setup();
    script_window(&feed, anchor_hour());
    controller.trigger_at(anchor_hour()).await.unwrap();

    let next_hour = anchor_hour() + Duration::hours(1);
    feed.set_anchor(next_hour);
    feed.script_with_dropped(next_hour, constellation(24), 100);

    let report = controller.trigger_at(next_hour).await.unwrap();
    assert_eq!(report.dropped_records, 100);
    assert_eq!(report.balloons_tracked, 3);
}

/// Store wrapper whose writes always fail.
struct BrokenWrites {
    inner: MemoryStore,
}

#[async_trait]
impl TrackStore for BrokenWrites {
    async fn put_snapshot(
        &self,
        _hour_ts: DateTime<Utc>,
        _observations: &[RawObservation],
    ) -> TrackResult<()> {
        Err(TrackError::StoreWriteFailed("disk on fire".to_string()))
    }

    async fn get_snapshot(
        &self,
        hour_ts: DateTime<Utc>,
    ) -> TrackResult<Option<strato_common::Snapshot>> {
        self.inner.get_snapshot(hour_ts).await
    }

    async fn latest_snapshot_time(&self) -> TrackResult<Option<DateTime<Utc>>> {
        self.inner.latest_snapshot_time().await
    }

    async fn list_snapshots(&self) -> TrackResult<Vec<strato_common::SnapshotMeta>> {
        self.inner.list_snapshots().await
    }

    async fn put_tracked(&self, batch: &[TrackedPosition]) -> TrackResult<()> {
        self.inner.put_tracked(batch).await
    }

    async fn tracked_at(&self, ts: DateTime<Utc>) -> TrackResult<Vec<TrackedPosition>> {
        self.inner.tracked_at(ts).await
    }

    async fn trajectory(&self, balloon_id: &str) -> TrackResult<Vec<TrackedPosition>> {
        self.inner.trajectory(balloon_id).await
    }

    async fn all_trajectories(&self) -> TrackResult<Vec<(String, Vec<TrackedPosition>)>> {
        self.inner.all_trajectories().await
    }

    async fn max_numeric_id(&self) -> TrackResult<Option<u64>> {
        self.inner.max_numeric_id().await
    }

    async fn cleanup(&self, older_than: DateTime<Utc>) -> TrackResult<(u64, u64)> {
        self.inner.cleanup(older_than).await
    }

    async fn clear_all(&self) -> TrackResult<()> {
        self.inner.clear_all().await
    }
}

#[tokio::test]
async fn persistent_write_failures_trip_the_failed_state() {
    let store = Arc::new(BrokenWrites { inner: MemoryStore::new() });
    let feed = Arc::new(ScriptedFeed::new(anchor_hour()));
    script_window(&feed, anchor_hour());

    let controller = IngestController::new(
        store as Arc<dyn TrackStore>,
        feed as Arc<dyn BalloonFeed>,
    );

    for _ in 0..2 {
        assert!(controller.trigger_at(anchor_hour()).await.is_err());
        // Still retrying: the next tick re-enters from the top.
        assert_ne!(controller.phase().await, Phase::Steady);
    }

    assert!(controller.trigger_at(anchor_hour()).await.is_err());
    assert_eq!(controller.phase().await, Phase::Failed);
}
