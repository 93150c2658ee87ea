//! Bounded TTL cache for upper-air wind vectors.
//!
//! Keys quantize location to 0.1 degrees and altitude to 0.1 km, which is
//! roughly 11 km horizontally and well inside the tracker's error budget.
//! Entries for the current wall-clock hour expire after 30 minutes (the
//! provider may still revise them); everything else is retained up to 48 h.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use lru::LruCache;
use tokio::sync::RwLock;

use strato_common::time::truncate_to_hour;
use strato_common::WindVector;

const DEFAULT_CAPACITY: usize = 4096;
const CURRENT_HOUR_TTL: Duration = Duration::from_secs(30 * 60);
const MAX_AGE: Duration = Duration::from_secs(48 * 3600);

/// Quantized spatial/temporal cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindKey {
    /// Latitude in tenths of a degree.
    pub lat_d1: i32,
    /// Longitude in tenths of a degree.
    pub lon_d1: i32,
    /// Altitude in tenths of a kilometre.
    pub alt_d1: i32,
    /// Hour timestamp, seconds since epoch.
    pub hour_epoch: i64,
}

impl WindKey {
    pub fn quantize(lat: f64, lon: f64, alt_km: f64, ts: DateTime<Utc>) -> Self {
        Self {
            lat_d1: (lat * 10.0).round() as i32,
            lon_d1: (lon * 10.0).round() as i32,
            alt_d1: (alt_km * 10.0).round() as i32,
            hour_epoch: truncate_to_hour(ts).timestamp(),
        }
    }
}

struct CachedWind {
    vector: WindVector,
    inserted_at: Instant,
}

impl CachedWind {
    fn is_expired(&self, now_hour: DateTime<Utc>) -> bool {
        let age = self.inserted_at.elapsed();
        if age > MAX_AGE {
            return true;
        }
        self.vector.hour_ts == now_hour && age > CURRENT_HOUR_TTL
    }
}

/// Bounded in-memory wind cache with lazy TTL expiration.
pub struct WindCache {
    cache: RwLock<LruCache<WindKey, CachedWind>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl WindCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity)
            .unwrap_or_else(|| NonZeroUsize::new(DEFAULT_CAPACITY).unwrap());
        Self {
            cache: RwLock::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Fetch a cached vector (returns None if missing or expired).
    pub async fn get(&self, key: &WindKey) -> Option<WindVector> {
        let now_hour = truncate_to_hour(Utc::now());
        let mut cache = self.cache.write().await;

        if let Some(entry) = cache.get(key) {
            if entry.is_expired(now_hour) {
                cache.pop(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            } else {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.vector.clone())
            }
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    /// Insert a vector under its quantized key.
    pub async fn insert(&self, vector: WindVector) {
        let key = WindKey::quantize(vector.lat, vector.lon, vector.alt_km, vector.hour_ts);
        self.insert_at(key, vector).await;
    }

    /// Insert a vector under an explicit key (the wind client keys results
    /// by the requested hour, which may differ from the bound sample hour).
    pub async fn insert_at(&self, key: WindKey, vector: WindVector) {
        let mut cache = self.cache.write().await;
        cache.put(key, CachedWind { vector, inserted_at: Instant::now() });
    }

    pub async fn len(&self) -> usize {
        self.cache.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cache.read().await.is_empty()
    }

    /// (hits, misses) counters since construction.
    pub fn stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}

impl Default for WindCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
