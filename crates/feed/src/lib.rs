//! Upstream balloon feed client.
//!
//! The feed publishes one JSON file per relative hour (`<base>/<HH>.json`,
//! offset 0..=23), each a bare array of `[lat, lon, alt_km]` triples with no
//! identity and no timestamps. Bodies are untrusted: corrupted records are a
//! filter, not a fault.

pub mod validate;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument, warn};

use strato_common::{RawObservation, TrackError, TrackResult};

pub use validate::parse_observations;

const FETCH_TIMEOUT_SECS: u64 = 30;

/// One hour's fetch result.
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    pub observations: Vec<RawObservation>,
    /// Records dropped by validation.
    pub dropped: usize,
    /// Set when the request itself failed and the hour came back empty.
    pub failure: Option<String>,
}

impl FetchOutcome {
    fn failed(reason: String) -> Self {
        Self { observations: Vec::new(), dropped: 0, failure: Some(reason) }
    }
}

/// Trait for balloon position sources.
#[async_trait]
pub trait BalloonFeed: Send + Sync {
    /// Fetch the snapshot `offset` hours in the past (0 = current hour).
    ///
    /// Request failures and corrupt bodies yield an empty outcome with the
    /// failure recorded; retry policy belongs to the ingest controller.
    async fn fetch_hour(&self, offset: u32) -> TrackResult<FetchOutcome>;
}

/// HTTP implementation against the live feed.
pub struct HttpBalloonFeed {
    client: Client,
    base_url: String,
}

impl HttpBalloonFeed {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(FETCH_TIMEOUT_SECS))
            .build()
            .expect("Failed to create HTTP client");

        Self { client, base_url: base_url.into() }
    }

    fn hour_url(&self, offset: u32) -> String {
        format!("{}/{:02}.json", self.base_url.trim_end_matches('/'), offset)
    }
}

#[async_trait]
impl BalloonFeed for HttpBalloonFeed {
    #[instrument(skip(self), fields(offset = offset))]
    async fn fetch_hour(&self, offset: u32) -> TrackResult<FetchOutcome> {
        if offset > 23 {
            return Err(TrackError::InvalidArgument(format!(
                "hour offset {} out of range [0,23]",
                offset
            )));
        }

        let url = self.hour_url(offset);
        debug!(url = %url, "Fetching snapshot hour");

        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %url, error = %e, "Feed request failed");
                return Ok(FetchOutcome::failed(format!("request failed: {}", e)));
            }
        };

        if !response.status().is_success() {
            warn!(url = %url, status = %response.status(), "Feed returned non-success status");
            return Ok(FetchOutcome::failed(format!("status {}", response.status())));
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!(url = %url, error = %e, "Failed to read feed body");
                return Ok(FetchOutcome::failed(format!("body read failed: {}", e)));
            }
        };

        match parse_observations(&body) {
            Ok((observations, dropped)) => {
                if dropped > 0 {
                    warn!(offset = offset, dropped = dropped, "Dropped corrupted feed records");
                }
                debug!(offset = offset, count = observations.len(), "Fetched snapshot hour");
                Ok(FetchOutcome { observations, dropped, failure: None })
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Feed body was not a snapshot array");
                Ok(FetchOutcome::failed(e.to_string()))
            }
        }
    }
}
