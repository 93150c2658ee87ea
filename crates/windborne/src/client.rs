//! Batched wind client against the atmospheric provider.
//!
//! Queries are grouped by pressure level, framed by past/forecast days, sent
//! in URL-length-safe batches of at most 300 locations, and bound back to
//! the requested timestamps. The wind cache is consulted before any request
//! leaves the process and updated after every successful batch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use storage::{WindCache, WindKey};
use strato_common::time::truncate_to_hour;
use strato_common::{TrackError, TrackResult, WindVector};

use crate::pressure::pressure_level_for_altitude;

const MAX_LOCATIONS_PER_REQUEST: usize = 300;
const BATCH_TIMEOUT_SECS: u64 = 30;
const BATCH_PAUSE: Duration = Duration::from_secs(1);
const RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(10);
const BIND_WINDOW_MINUTES: i64 = 90;

/// One wind lookup request.
#[derive(Debug, Clone, Copy)]
pub struct WindQuery {
    pub lat: f64,
    pub lon: f64,
    pub alt_km: f64,
    /// Defaults to the current hour when absent.
    pub ts: Option<DateTime<Utc>>,
}

impl WindQuery {
    pub fn new(lat: f64, lon: f64, alt_km: f64) -> Self {
        Self { lat, lon, alt_km, ts: None }
    }

    pub fn at(lat: f64, lon: f64, alt_km: f64, ts: DateTime<Utc>) -> Self {
        Self { lat, lon, alt_km, ts: Some(ts) }
    }
}

/// Trait seam for components that need batched wind lookups.
#[async_trait]
pub trait WindFetcher: Send + Sync {
    /// Resolve wind vectors for a set of locations. Missing entries (rate
    /// limited batches, binding failures) are simply absent from the map.
    async fn wind_for(&self, queries: &[WindQuery]) -> TrackResult<HashMap<WindKey, WindVector>>;
}

/// HTTP wind client with cache integration.
pub struct WindClient {
    client: Client,
    base_url: String,
    cache: Arc<WindCache>,
}

impl WindClient {
    pub fn new(base_url: impl Into<String>, cache: Arc<WindCache>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(BATCH_TIMEOUT_SECS))
            .build()
            .expect("Failed to create HTTP client");

        Self { client, base_url: base_url.into(), cache }
    }

    pub fn cache(&self) -> Arc<WindCache> {
        Arc::clone(&self.cache)
    }

    async fn fetch_group(
        &self,
        level: u32,
        group: &[ResolvedQuery],
        now: DateTime<Utc>,
        results: &mut HashMap<WindKey, WindVector>,
    ) {
        let min_ts = group.iter().map(|q| q.ts).min().unwrap_or(now);
        let max_ts = group.iter().map(|q| q.ts).max().unwrap_or(now);
        let (past_days, forecast_days) = frame_days(min_ts, max_ts, now);

        for chunk in group.chunks(MAX_LOCATIONS_PER_REQUEST) {
            let url = build_request_url(
                &self.base_url,
                level,
                chunk.iter().map(|q| (q.lat, q.lon)),
                past_days,
                forecast_days,
            );

            let response = match self.client.get(&url).send().await {
                Ok(response) => response,
                Err(e) => {
                    warn!(level = level, error = %e, "Wind batch request failed");
                    continue;
                }
            };

            if response.status() == StatusCode::TOO_MANY_REQUESTS {
                warn!(level = level, "Wind provider rate limited, skipping batch");
                tokio::time::sleep(RATE_LIMIT_BACKOFF).await;
                continue;
            }

            if !response.status().is_success() {
                warn!(level = level, status = %response.status(), "Wind batch rejected");
                continue;
            }

            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    warn!(level = level, error = %e, "Failed to read wind body");
                    continue;
                }
            };

            let series = match parse_provider_response(&body, level) {
                Ok(series) => series,
                Err(e) => {
                    warn!(level = level, error = %e, "Failed to parse wind body");
                    continue;
                }
            };

            if series.len() != chunk.len() {
                warn!(
                    level = level,
                    expected = chunk.len(),
                    got = series.len(),
                    "Wind response location count mismatch"
                );
                continue;
            }

            let mut bound = 0usize;
            for (query, hourly) in chunk.iter().zip(series.iter()) {
                if let Some(sample) = bind_closest_hour(hourly, query.ts) {
                    let vector = sample.into_vector(query, level);
                    self.cache.insert_at(query.key, vector.clone()).await;
                    results.insert(query.key, vector);
                    bound += 1;
                }
            }

            debug!(level = level, locations = chunk.len(), bound = bound, "Wind batch resolved");
            tokio::time::sleep(BATCH_PAUSE).await;
        }
    }
}

#[async_trait]
impl WindFetcher for WindClient {
    #[instrument(skip(self, queries), fields(count = queries.len()))]
    async fn wind_for(&self, queries: &[WindQuery]) -> TrackResult<HashMap<WindKey, WindVector>> {
        let now = Utc::now();
        let mut results = HashMap::new();
        let mut misses: Vec<ResolvedQuery> = Vec::new();

        for query in queries {
            let ts = query.ts.unwrap_or(now);
            let key = WindKey::quantize(query.lat, query.lon, query.alt_km, ts);
            if results.contains_key(&key) || misses.iter().any(|m| m.key == key) {
                continue;
            }
            match self.cache.get(&key).await {
                Some(vector) => {
                    results.insert(key, vector);
                }
                None => misses.push(ResolvedQuery {
                    key,
                    lat: query.lat,
                    lon: query.lon,
                    alt_km: query.alt_km,
                    ts,
                }),
            }
        }

        if misses.is_empty() {
            return Ok(results);
        }

        let mut groups: HashMap<u32, Vec<ResolvedQuery>> = HashMap::new();
        for miss in misses {
            let level = pressure_level_for_altitude(miss.alt_km);
            groups.entry(level).or_default().push(miss);
        }

        debug!(groups = groups.len(), "Fetching wind for cache misses");
        for (level, group) in groups {
            self.fetch_group(level, &group, now, &mut results).await;
        }

        Ok(results)
    }
}

/// A query with its cache key and concrete timestamp resolved.
#[derive(Debug, Clone, Copy)]
struct ResolvedQuery {
    key: WindKey,
    lat: f64,
    lon: f64,
    alt_km: f64,
    ts: DateTime<Utc>,
}

/// Hourly series for one requested location.
#[derive(Debug, Clone, Default)]
pub struct HourlySeries {
    pub times: Vec<DateTime<Utc>>,
    pub speeds_kmh: Vec<Option<f64>>,
    pub directions_deg: Vec<Option<f64>>,
}

/// One bound wind sample.
#[derive(Debug, Clone, Copy)]
pub struct BoundSample {
    pub hour_ts: DateTime<Utc>,
    pub speed_kmh: f64,
    pub direction_deg_from: f64,
}

impl BoundSample {
    fn into_vector(self, query: &ResolvedQuery, level: u32) -> WindVector {
        let (u_ms, v_ms) = wind_components_ms(self.speed_kmh, self.direction_deg_from);
        WindVector {
            lat: query.lat,
            lon: query.lon,
            alt_km: query.alt_km,
            pressure_hpa: level,
            u_ms,
            v_ms,
            speed_kmh: self.speed_kmh,
            direction_deg_from: self.direction_deg_from,
            hour_ts: truncate_to_hour(self.hour_ts),
        }
    }
}

/// Decompose a meteorological "from" bearing into eastward/northward
/// components in m/s (the direction the wind is blowing toward).
pub fn wind_components_ms(speed_kmh: f64, direction_deg_from: f64) -> (f64, f64) {
    let speed_ms = speed_kmh / 3.6;
    let theta = direction_deg_from.to_radians();
    (-speed_ms * theta.sin(), -speed_ms * theta.cos())
}

/// Past/forecast day framing covering `[min_ts, max_ts]`, capped at 3 each.
pub fn frame_days(
    min_ts: DateTime<Utc>,
    max_ts: DateTime<Utc>,
    now: DateTime<Utc>,
) -> (u32, u32) {
    let days_back = (now.date_naive() - min_ts.date_naive()).num_days().max(0);
    let days_ahead = (max_ts.date_naive() - now.date_naive()).num_days().max(0);

    let past_days = days_back.min(3) as u32;
    let forecast_days = (days_ahead + 1).clamp(1, 3) as u32;
    (past_days, forecast_days)
}

/// Build one provider request URL for a batch of locations.
pub fn build_request_url(
    base_url: &str,
    level: u32,
    locations: impl Iterator<Item = (f64, f64)>,
    past_days: u32,
    forecast_days: u32,
) -> String {
    let mut lats = String::new();
    let mut lons = String::new();
    for (i, (lat, lon)) in locations.enumerate() {
        if i > 0 {
            lats.push(',');
            lons.push(',');
        }
        lats.push_str(&format!("{:.4}", lat));
        lons.push_str(&format!("{:.4}", lon));
    }

    format!(
        "{}/v1/forecast?latitude={}&longitude={}&hourly=wind_speed_{}hPa,wind_direction_{}hPa&past_days={}&forecast_days={}&timezone=UTC",
        base_url.trim_end_matches('/'),
        lats,
        lons,
        level,
        level,
        past_days,
        forecast_days
    )
}

/// Parse a provider body into one series per requested location.
///
/// The provider returns a single object for one location and an array for
/// several; both carry `hourly.time[]` (naive ISO minutes, UTC) plus the two
/// wind arrays for the requested level.
pub fn parse_provider_response(body: &str, level: u32) -> TrackResult<Vec<HourlySeries>> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| TrackError::WindUnavailable(format!("not JSON: {}", e)))?;

    let elements: Vec<&Value> = match &value {
        Value::Array(items) => items.iter().collect(),
        Value::Object(_) => vec![&value],
        _ => {
            return Err(TrackError::WindUnavailable(
                "expected object or array response".to_string(),
            ))
        }
    };

    let speed_key = format!("wind_speed_{}hPa", level);
    let direction_key = format!("wind_direction_{}hPa", level);

    elements
        .into_iter()
        .map(|element| {
            let hourly = element
                .get("hourly")
                .ok_or_else(|| TrackError::WindUnavailable("missing hourly block".to_string()))?;

            let times = hourly
                .get("time")
                .and_then(Value::as_array)
                .ok_or_else(|| TrackError::WindUnavailable("missing hourly.time".to_string()))?
                .iter()
                .filter_map(Value::as_str)
                .filter_map(parse_naive_utc)
                .collect::<Vec<_>>();

            let speeds_kmh = optional_f64_array(hourly, &speed_key);
            let directions_deg = optional_f64_array(hourly, &direction_key);

            Ok(HourlySeries { times, speeds_kmh, directions_deg })
        })
        .collect()
}

fn optional_f64_array(hourly: &Value, key: &str) -> Vec<Option<f64>> {
    hourly
        .get(key)
        .and_then(Value::as_array)
        .map(|items| items.iter().map(Value::as_f64).collect())
        .unwrap_or_default()
}

fn parse_naive_utc(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Pick the response hour closest to the requested timestamp, discarding
/// anything further than 90 minutes away or with missing wind values.
pub fn bind_closest_hour(series: &HourlySeries, requested: DateTime<Utc>) -> Option<BoundSample> {
    let mut best: Option<(i64, BoundSample)> = None;

    for (i, time) in series.times.iter().enumerate() {
        let (Some(speed), Some(direction)) = (
            series.speeds_kmh.get(i).copied().flatten(),
            series.directions_deg.get(i).copied().flatten(),
        ) else {
            continue;
        };

        let distance = (*time - requested).num_minutes().abs();
        if distance > BIND_WINDOW_MINUTES {
            continue;
        }
        if best.map_or(true, |(d, _)| distance < d) {
            best = Some((
                distance,
                BoundSample { hour_ts: *time, speed_kmh: speed, direction_deg_from: direction },
            ));
        }
    }

    best.map(|(_, sample)| sample)
}
