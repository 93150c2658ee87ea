//! Storage abstractions for stratotrack services.
//!
//! Provides the `TrackStore` contract shared by the ingest controller and
//! the read side, a PostgreSQL implementation, an in-memory implementation
//! for tests and local runs, and the bounded TTL wind cache.

pub mod memory;
pub mod postgres;
pub mod store;
pub mod wind_cache;

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use store::TrackStore;
pub use wind_cache::{WindCache, WindKey};
