//! Ingest controller: the single logical writer.
//!
//! On every tick the controller decides between a no-op, an incremental
//! hour, a gap fill, or a full 24-hour rebuild, then drives
//! feed -> tracker -> store -> cleanup in strict order. Overlapping
//! invocations serialize on an internal mutex; the later one observes the
//! updated latest snapshot hour and typically no-ops.
//!
//! The store is canonical. The per-id segment history held here is a cache:
//! it is rebuilt from stored trajectories during bootstrap and replaced
//! atomically inside the tick, never written back.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use feed::BalloonFeed;
use storage::TrackStore;
use strato_common::time::{hour_at_offset, now_hour};
use strato_common::{TrackError, TrackResult, TrackedPosition};
use tracker::{advance_history, history_from_trajectories, track, IdAllocator, SegmentHistory};

/// Bounded parallelism for full-rebuild fetches.
const REBUILD_CONCURRENCY: usize = 6;
/// Hours retained in the rolling window.
const WINDOW_HOURS: i64 = 24;
/// Cleanup cutoff: everything strictly older than `now - 23h` goes, leaving
/// exactly the 24 hourly rows of the window.
const RETENTION_HOURS: i64 = WINDOW_HOURS - 1;
/// Consecutive store write failures before entering Failed.
const MAX_WRITE_FAILURES: u32 = 3;

/// Controller lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Uninitialized,
    Bootstrapping,
    Steady,
    CatchUp,
    Rebuilding,
    Failed,
}

/// Counters from one tick, surfaced by the refresh endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    pub phase: Phase,
    pub hour: DateTime<Utc>,
    pub no_op: bool,
    pub rebuilt: bool,
    pub hours_ingested: u32,
    pub balloons_tracked: usize,
    pub new_ids: usize,
    pub dropped_records: usize,
    pub tracked_deleted: u64,
    pub snapshots_deleted: u64,
}

impl TickReport {
    fn no_op(hour: DateTime<Utc>) -> Self {
        Self {
            phase: Phase::Steady,
            hour,
            no_op: true,
            rebuilt: false,
            hours_ingested: 0,
            balloons_tracked: 0,
            new_ids: 0,
            dropped_records: 0,
            tracked_deleted: 0,
            snapshots_deleted: 0,
        }
    }
}

struct ControllerState {
    phase: Phase,
    ids: IdAllocator,
    history: SegmentHistory,
    write_failures: u32,
}

/// Orchestrator over feed, tracker and store.
pub struct IngestController {
    store: Arc<dyn TrackStore>,
    feed: Arc<dyn BalloonFeed>,
    state: Mutex<ControllerState>,
}

impl IngestController {
    pub fn new(store: Arc<dyn TrackStore>, feed: Arc<dyn BalloonFeed>) -> Self {
        Self {
            store,
            feed,
            state: Mutex::new(ControllerState {
                phase: Phase::Uninitialized,
                ids: IdAllocator::new(0),
                history: SegmentHistory::new(),
                write_failures: 0,
            }),
        }
    }

    /// Current lifecycle phase.
    pub async fn phase(&self) -> Phase {
        self.state.lock().await.phase
    }

    /// Run one tick against the current wall clock.
    pub async fn trigger_once(&self) -> TrackResult<TickReport> {
        self.trigger_at(now_hour()).await
    }

    /// Run one tick for an explicit hour. The clock-injected variant that
    /// `trigger_once` wraps; integration tests drive it directly.
    #[instrument(skip(self), fields(hour = %hour))]
    pub async fn trigger_at(&self, hour: DateTime<Utc>) -> TrackResult<TickReport> {
        let mut state = self.state.lock().await;

        let result = match state.phase {
            Phase::Uninitialized | Phase::Failed => self.bootstrap(&mut state, hour).await,
            _ => self.steady_tick(&mut state, hour).await,
        };

        match result {
            Ok(report) => {
                state.write_failures = 0;
                Ok(report)
            }
            Err(e) => {
                match &e {
                    TrackError::StoreWriteFailed(_) | TrackError::StoreReadFailed(_) => {
                        state.write_failures += 1;
                        if state.write_failures >= MAX_WRITE_FAILURES {
                            error!(failures = state.write_failures, "Store failing persistently");
                            state.phase = Phase::Failed;
                        }
                    }
                    _ => {
                        state.phase = Phase::Failed;
                    }
                }
                error!(error = %e, phase = ?state.phase, "Tick failed");
                Err(e)
            }
        }
    }

    /// Classify persisted state and bring the window up to date.
    async fn bootstrap(
        &self,
        state: &mut ControllerState,
        now: DateTime<Utc>,
    ) -> TrackResult<TickReport> {
        state.phase = Phase::Bootstrapping;
        info!("Bootstrapping from persisted state");

        let max_id = self.store.max_numeric_id().await?;
        state.ids = IdAllocator::new(max_id.map_or(0, |n| n + 1));

        let trajectories = self.store.all_trajectories().await?;
        state.history = history_from_trajectories(&trajectories);

        let latest = self.store.latest_snapshot_time().await?;
        let window_start = now - Duration::hours(RETENTION_HOURS);

        let usable_latest = match latest {
            Some(latest) if latest >= window_start => {
                // Tolerate partial persisted state: an empty snapshot or a
                // snapshot hour with no tracked rows both force a rebuild.
                let snapshot_ok = self
                    .store
                    .get_snapshot(latest)
                    .await?
                    .map_or(false, |s| !s.observations.is_empty());
                let tracked_ok = !self.store.tracked_at(latest).await?.is_empty();
                (snapshot_ok && tracked_ok).then_some(latest)
            }
            _ => None,
        };

        match usable_latest {
            Some(latest) if latest == now => {
                info!("Window already current, entering steady state");
                state.phase = Phase::Steady;
                Ok(TickReport::no_op(now))
            }
            Some(latest) => {
                info!(latest = %latest, "Filling gap hours");
                state.phase = Phase::CatchUp;
                let report = self.catch_up(state, latest, now).await?;
                state.phase = Phase::Steady;
                Ok(report)
            }
            None => {
                info!("No usable window, rebuilding all 24 hours");
                state.phase = Phase::Rebuilding;
                let report = self.full_rebuild(state, now).await?;
                state.phase = Phase::Steady;
                Ok(report)
            }
        }
    }

    /// Steady-state tick: no-op, single incremental hour, gap fill, or
    /// fallback rebuild when the feed comes back empty.
    async fn steady_tick(
        &self,
        state: &mut ControllerState,
        now: DateTime<Utc>,
    ) -> TrackResult<TickReport> {
        let latest = self.store.latest_snapshot_time().await?;
        let window_start = now - Duration::hours(RETENTION_HOURS);

        match latest {
            Some(latest) if latest == now => Ok(TickReport::no_op(now)),
            Some(latest) if latest >= window_start && latest == now - Duration::hours(1) => {
                self.incremental(state, now).await
            }
            Some(latest) if latest >= window_start => {
                // Missed ticks while running: fill the gap.
                state.phase = Phase::CatchUp;
                let report = self.catch_up(state, latest, now).await?;
                state.phase = Phase::Steady;
                Ok(report)
            }
            _ => {
                state.phase = Phase::Rebuilding;
                let report = self.full_rebuild(state, now).await?;
                state.phase = Phase::Steady;
                Ok(report)
            }
        }
    }

    /// The Steady -> Steady incremental step.
    async fn incremental(
        &self,
        state: &mut ControllerState,
        now: DateTime<Utc>,
    ) -> TrackResult<TickReport> {
        let outcome = self.feed.fetch_hour(0).await?;

        if outcome.observations.is_empty() {
            warn!(failure = ?outcome.failure, "Current hour came back empty, rebuilding");
            state.phase = Phase::Rebuilding;
            let report = self.full_rebuild(state, now).await?;
            state.phase = Phase::Steady;
            return Ok(report);
        }

        self.store.put_snapshot(now, &outcome.observations).await?;

        let prev = self.store.tracked_at(now - Duration::hours(1)).await?;
        let tracked = track(now, &outcome.observations, &prev, &state.history, &mut state.ids);
        let new_ids = count_new(&tracked);
        self.store.put_tracked(&tracked).await?;
        state.history = advance_history(&state.history, &tracked);

        let (tracked_deleted, snapshots_deleted) =
            self.store.cleanup(now - Duration::hours(RETENTION_HOURS)).await?;

        info!(
            hour = %now,
            tracked = tracked.len(),
            new_ids = new_ids,
            dropped = outcome.dropped,
            "Ingested incremental hour"
        );

        Ok(TickReport {
            phase: Phase::Steady,
            hour: now,
            no_op: false,
            rebuilt: false,
            hours_ingested: 1,
            balloons_tracked: tracked.len(),
            new_ids,
            dropped_records: outcome.dropped,
            tracked_deleted,
            snapshots_deleted,
        })
    }

    /// Fetch and track every hour in `(latest, now]`, oldest first.
    async fn catch_up(
        &self,
        state: &mut ControllerState,
        latest: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> TrackResult<TickReport> {
        let mut hours_ingested = 0u32;
        let mut dropped = 0usize;
        let mut new_ids = 0usize;
        let mut last_tracked = 0usize;

        let gap = (now - latest).num_hours();
        let mut prev = self.store.tracked_at(latest).await?;

        for back in (0..gap).rev() {
            let hour = now - Duration::hours(back);
            let offset = back as u32;

            let outcome = self.feed.fetch_hour(offset).await?;
            if outcome.observations.is_empty() {
                warn!(hour = %hour, "Gap hour unavailable, skipping");
                continue;
            }

            self.store.put_snapshot(hour, &outcome.observations).await?;
            let tracked = track(hour, &outcome.observations, &prev, &state.history, &mut state.ids);
            new_ids += count_new(&tracked);
            self.store.put_tracked(&tracked).await?;
            state.history = advance_history(&state.history, &tracked);

            dropped += outcome.dropped;
            hours_ingested += 1;
            last_tracked = tracked.len();
            prev = tracked;
        }

        let (tracked_deleted, snapshots_deleted) =
            self.store.cleanup(now - Duration::hours(RETENTION_HOURS)).await?;

        info!(hours = hours_ingested, "Filled gap hours");

        Ok(TickReport {
            phase: Phase::Steady,
            hour: now,
            no_op: false,
            rebuilt: false,
            hours_ingested,
            balloons_tracked: last_tracked,
            new_ids,
            dropped_records: dropped,
            tracked_deleted,
            snapshots_deleted,
        })
    }

    /// Reconstruct the whole 24-hour window from cold.
    async fn full_rebuild(
        &self,
        state: &mut ControllerState,
        now: DateTime<Utc>,
    ) -> TrackResult<TickReport> {
        info!("Starting full rebuild");

        // Bounded parallel fetch of all 24 hours.
        let mut fetched = stream::iter((0u32..24).map(|offset| {
            let feed = Arc::clone(&self.feed);
            async move { (offset, feed.fetch_hour(offset).await) }
        }))
        .buffer_unordered(REBUILD_CONCURRENCY)
        .collect::<Vec<_>>()
        .await;
        fetched.sort_by_key(|(offset, _)| *offset);

        // A fully dead feed must not wipe the window readers are still
        // serving; keep the stale data and let data age tell the story.
        let any_data = fetched
            .iter()
            .any(|(_, result)| matches!(result, Ok(o) if !o.observations.is_empty()));
        if !any_data {
            warn!("Feed returned no data for any hour, keeping previous window");
            return Ok(TickReport {
                phase: Phase::Steady,
                hour: now,
                no_op: false,
                rebuilt: true,
                hours_ingested: 0,
                balloons_tracked: 0,
                new_ids: 0,
                dropped_records: 0,
                tracked_deleted: 0,
                snapshots_deleted: 0,
            });
        }

        // Rebuilds re-resolve every identity; stale rows under old ids must
        // not survive next to the fresh window.
        self.store.clear_all().await?;

        let mut hours_ingested = 0u32;
        let mut dropped = 0usize;
        let mut new_ids = 0usize;
        let mut last_tracked = 0usize;

        // Track oldest to newest, feeding each output as the next previous.
        let mut prev: Vec<TrackedPosition> = Vec::new();
        let mut history = SegmentHistory::new();

        for (offset, outcome) in fetched.into_iter().rev() {
            let outcome = outcome?;
            let hour = hour_at_offset(now, offset);

            if outcome.observations.is_empty() {
                if let Some(failure) = &outcome.failure {
                    warn!(hour = %hour, failure = %failure, "Rebuild hour unavailable");
                }
                continue;
            }

            self.store.put_snapshot(hour, &outcome.observations).await?;
            let tracked = track(hour, &outcome.observations, &prev, &history, &mut state.ids);
            new_ids += count_new(&tracked);
            self.store.put_tracked(&tracked).await?;
            history = advance_history(&history, &tracked);

            dropped += outcome.dropped;
            hours_ingested += 1;
            last_tracked = tracked.len();
            prev = tracked;

            debug!(hour = %hour, tracked = last_tracked, "Rebuilt hour");
        }

        state.history = history;

        let (tracked_deleted, snapshots_deleted) =
            self.store.cleanup(now - Duration::hours(RETENTION_HOURS)).await?;

        info!(hours = hours_ingested, balloons = last_tracked, "Rebuild complete");

        Ok(TickReport {
            phase: Phase::Steady,
            hour: now,
            no_op: false,
            rebuilt: true,
            hours_ingested,
            balloons_tracked: last_tracked,
            new_ids,
            dropped_records: dropped,
            tracked_deleted,
            snapshots_deleted,
        })
    }
}

fn count_new(tracked: &[TrackedPosition]) -> usize {
    tracked
        .iter()
        .filter(|p| p.status == strato_common::BalloonStatus::New)
        .count()
}
