//! PostgreSQL-backed track store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool, Row};

use strato_common::{
    BalloonStatus, RawObservation, Snapshot, SnapshotMeta, TrackError, TrackResult,
    TrackedPosition,
};

use crate::store::TrackStore;

/// Database connection pool and track storage operations.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new store connection from database URL.
    pub async fn connect(database_url: &str) -> TrackResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| TrackError::StoreReadFailed(format!("Connection failed: {}", e)))?;

        Ok(Self { pool })
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> TrackResult<()> {
        // Split SQL statements and execute them individually
        for statement in SCHEMA_SQL.split(';') {
            let trimmed = statement.trim();
            if !trimmed.is_empty() {
                sqlx::query(trimmed)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| {
                        TrackError::StoreWriteFailed(format!("Migration failed: {}", e))
                    })?;
            }
        }

        Ok(())
    }
}

#[async_trait]
impl TrackStore for PgStore {
    async fn put_snapshot(
        &self,
        hour_ts: DateTime<Utc>,
        observations: &[RawObservation],
    ) -> TrackResult<()> {
        let body = serde_json::to_value(observations)
            .map_err(|e| TrackError::StoreWriteFailed(format!("Encode failed: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO snapshots (hour_ts, observations, fetched_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (hour_ts)
            DO UPDATE SET
                observations = EXCLUDED.observations,
                fetched_at = EXCLUDED.fetched_at
            "#,
        )
        .bind(hour_ts)
        .bind(body)
        .execute(&self.pool)
        .await
        .map_err(|e| TrackError::StoreWriteFailed(format!("Insert failed: {}", e)))?;

        Ok(())
    }

    async fn get_snapshot(&self, hour_ts: DateTime<Utc>) -> TrackResult<Option<Snapshot>> {
        let row = sqlx::query("SELECT observations FROM snapshots WHERE hour_ts = $1")
            .bind(hour_ts)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| TrackError::StoreReadFailed(format!("Query failed: {}", e)))?;

        match row {
            Some(row) => {
                let body: serde_json::Value = row
                    .try_get("observations")
                    .map_err(|e| TrackError::StoreReadFailed(format!("Decode failed: {}", e)))?;
                let observations: Vec<RawObservation> = serde_json::from_value(body)
                    .map_err(|e| TrackError::StoreReadFailed(format!("Decode failed: {}", e)))?;
                Ok(Some(Snapshot { hour_ts, observations }))
            }
            None => Ok(None),
        }
    }

    async fn latest_snapshot_time(&self) -> TrackResult<Option<DateTime<Utc>>> {
        let latest = sqlx::query_scalar::<_, DateTime<Utc>>(
            "SELECT hour_ts FROM snapshots ORDER BY hour_ts DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| TrackError::StoreReadFailed(format!("Query failed: {}", e)))?;

        Ok(latest)
    }

    async fn list_snapshots(&self) -> TrackResult<Vec<SnapshotMeta>> {
        let rows = sqlx::query(
            "SELECT hour_ts, jsonb_array_length(observations) AS observation_count \
             FROM snapshots ORDER BY hour_ts DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| TrackError::StoreReadFailed(format!("Query failed: {}", e)))?;

        rows.into_iter()
            .map(|row| {
                let hour_ts: DateTime<Utc> = row
                    .try_get("hour_ts")
                    .map_err(|e| TrackError::StoreReadFailed(format!("Decode failed: {}", e)))?;
                let count: i32 = row
                    .try_get("observation_count")
                    .map_err(|e| TrackError::StoreReadFailed(format!("Decode failed: {}", e)))?;
                Ok(SnapshotMeta { hour_ts, observation_count: count as usize })
            })
            .collect()
    }

    async fn put_tracked(&self, batch: &[TrackedPosition]) -> TrackResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| TrackError::StoreWriteFailed(format!("Begin failed: {}", e)))?;

        for pos in batch {
            sqlx::query(
                r#"
                INSERT INTO tracked_positions (
                    balloon_id, ts, lat, lon, alt_km,
                    speed_kmh, heading_deg, status, confidence
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ON CONFLICT (balloon_id, ts)
                DO UPDATE SET
                    lat = EXCLUDED.lat,
                    lon = EXCLUDED.lon,
                    alt_km = EXCLUDED.alt_km,
                    speed_kmh = EXCLUDED.speed_kmh,
                    heading_deg = EXCLUDED.heading_deg,
                    status = EXCLUDED.status,
                    confidence = EXCLUDED.confidence
                "#,
            )
            .bind(&pos.balloon_id)
            .bind(pos.ts)
            .bind(pos.lat)
            .bind(pos.lon)
            .bind(pos.alt_km)
            .bind(pos.speed_kmh)
            .bind(pos.heading_deg)
            .bind(pos.status.as_str())
            .bind(pos.confidence)
            .execute(&mut *tx)
            .await
            .map_err(|e| TrackError::StoreWriteFailed(format!("Insert failed: {}", e)))?;
        }

        tx.commit()
            .await
            .map_err(|e| TrackError::StoreWriteFailed(format!("Commit failed: {}", e)))?;

        Ok(())
    }

    async fn tracked_at(&self, ts: DateTime<Utc>) -> TrackResult<Vec<TrackedPosition>> {
        let rows = sqlx::query_as::<_, TrackedRow>(
            "SELECT balloon_id, ts, lat, lon, alt_km, speed_kmh, heading_deg, status, confidence \
             FROM tracked_positions WHERE ts = $1 ORDER BY balloon_id",
        )
        .bind(ts)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| TrackError::StoreReadFailed(format!("Query failed: {}", e)))?;

        rows.into_iter().map(TrackedPosition::try_from).collect()
    }

    async fn trajectory(&self, balloon_id: &str) -> TrackResult<Vec<TrackedPosition>> {
        let rows = sqlx::query_as::<_, TrackedRow>(
            "SELECT balloon_id, ts, lat, lon, alt_km, speed_kmh, heading_deg, status, confidence \
             FROM tracked_positions WHERE balloon_id = $1 ORDER BY ts ASC",
        )
        .bind(balloon_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| TrackError::StoreReadFailed(format!("Query failed: {}", e)))?;

        rows.into_iter().map(TrackedPosition::try_from).collect()
    }

    async fn all_trajectories(&self) -> TrackResult<Vec<(String, Vec<TrackedPosition>)>> {
        let rows = sqlx::query_as::<_, TrackedRow>(
            "SELECT balloon_id, ts, lat, lon, alt_km, speed_kmh, heading_deg, status, confidence \
             FROM tracked_positions ORDER BY balloon_id, ts ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| TrackError::StoreReadFailed(format!("Query failed: {}", e)))?;

        let mut trajectories: Vec<(String, Vec<TrackedPosition>)> = Vec::new();
        for row in rows {
            let pos = TrackedPosition::try_from(row)?;
            match trajectories.last_mut() {
                Some((id, positions)) if *id == pos.balloon_id => positions.push(pos),
                _ => trajectories.push((pos.balloon_id.clone(), vec![pos])),
            }
        }
        Ok(trajectories)
    }

    async fn max_numeric_id(&self) -> TrackResult<Option<u64>> {
        let max = sqlx::query_scalar::<_, Option<i64>>(
            r#"
            SELECT MAX(CAST(SUBSTRING(balloon_id FROM 9) AS BIGINT))
            FROM tracked_positions
            WHERE balloon_id ~ '^balloon_[0-9]+$'
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| TrackError::StoreReadFailed(format!("Query failed: {}", e)))?;

        Ok(max.and_then(|n| u64::try_from(n).ok()))
    }

    async fn cleanup(&self, older_than: DateTime<Utc>) -> TrackResult<(u64, u64)> {
        let tracked = sqlx::query("DELETE FROM tracked_positions WHERE ts < $1")
            .bind(older_than)
            .execute(&self.pool)
            .await
            .map_err(|e| TrackError::StoreWriteFailed(format!("Delete failed: {}", e)))?;

        let snapshots = sqlx::query("DELETE FROM snapshots WHERE hour_ts < $1")
            .bind(older_than)
            .execute(&self.pool)
            .await
            .map_err(|e| TrackError::StoreWriteFailed(format!("Delete failed: {}", e)))?;

        Ok((tracked.rows_affected(), snapshots.rows_affected()))
    }

    async fn clear_all(&self) -> TrackResult<()> {
        sqlx::query("TRUNCATE tracked_positions, snapshots")
            .execute(&self.pool)
            .await
            .map_err(|e| TrackError::StoreWriteFailed(format!("Truncate failed: {}", e)))?;

        Ok(())
    }
}

/// Internal row type for database queries.
#[derive(FromRow)]
struct TrackedRow {
    balloon_id: String,
    ts: DateTime<Utc>,
    lat: f64,
    lon: f64,
    alt_km: f64,
    speed_kmh: Option<f64>,
    heading_deg: Option<f64>,
    status: String,
    confidence: f64,
}

impl TryFrom<TrackedRow> for TrackedPosition {
    type Error = TrackError;

    fn try_from(row: TrackedRow) -> TrackResult<TrackedPosition> {
        let status = BalloonStatus::parse(&row.status)
            .ok_or_else(|| TrackError::StoreReadFailed(format!("Bad status: {}", row.status)))?;
        Ok(TrackedPosition {
            balloon_id: row.balloon_id,
            ts: row.ts,
            lat: row.lat,
            lon: row.lon,
            alt_km: row.alt_km,
            speed_kmh: row.speed_kmh,
            heading_deg: row.heading_deg,
            status,
            confidence: row.confidence,
        })
    }
}

/// Database schema SQL.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS snapshots (
    hour_ts TIMESTAMPTZ PRIMARY KEY,
    observations JSONB NOT NULL,
    fetched_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS tracked_positions (
    balloon_id VARCHAR(32) NOT NULL,
    ts TIMESTAMPTZ NOT NULL,
    lat DOUBLE PRECISION NOT NULL,
    lon DOUBLE PRECISION NOT NULL,
    alt_km DOUBLE PRECISION NOT NULL,
    speed_kmh DOUBLE PRECISION,
    heading_deg DOUBLE PRECISION,
    status VARCHAR(16) NOT NULL,
    confidence DOUBLE PRECISION NOT NULL,

    PRIMARY KEY (balloon_id, ts)
);

CREATE INDEX IF NOT EXISTS idx_tracked_ts ON tracked_positions(ts);
CREATE INDEX IF NOT EXISTS idx_tracked_id_ts ON tracked_positions(balloon_id, ts)
"#;
