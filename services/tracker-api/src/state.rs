//! Application state for the tracker API.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use feed::{BalloonFeed, HttpBalloonFeed};
use ingest::IngestController;
use prediction::Predictor;
use storage::{MemoryStore, PgStore, TrackStore, WindCache};
use windborne::WindClient;

use crate::query::QueryService;

/// Service configuration, resolved from CLI flags and environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub memory_store: bool,
    pub feed_base_url: String,
    pub wind_base_url: String,
    pub wind_cache_capacity: usize,
    pub auto_update: bool,
}

/// Shared application state.
pub struct AppState {
    pub store: Arc<dyn TrackStore>,
    pub controller: Arc<IngestController>,
    pub wind: Arc<WindClient>,
    pub predictor: Predictor,
    pub query: QueryService,
    pub auto_update: bool,
}

impl AppState {
    pub async fn new(config: &AppConfig) -> Result<Self> {
        let store: Arc<dyn TrackStore> = if config.memory_store {
            info!("Using in-memory store");
            Arc::new(MemoryStore::new())
        } else {
            info!("Connecting to PostgreSQL store");
            let pg = PgStore::connect(&config.database_url).await?;
            pg.migrate().await?;
            Arc::new(pg)
        };

        let feed: Arc<dyn BalloonFeed> =
            Arc::new(HttpBalloonFeed::new(config.feed_base_url.clone()));

        let wind_cache = Arc::new(WindCache::new(config.wind_cache_capacity));
        let wind = Arc::new(WindClient::new(
            config.wind_base_url.clone(),
            Arc::clone(&wind_cache),
        ));

        let controller = Arc::new(IngestController::new(Arc::clone(&store), feed));
        let predictor = Predictor::new(wind_cache);
        let query = QueryService::new(Arc::clone(&store));

        Ok(Self {
            store,
            controller,
            wind,
            predictor,
            query,
            auto_update: config.auto_update,
        })
    }
}
