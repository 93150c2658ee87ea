//! Common types and utilities shared across all stratotrack crates.

pub mod error;
pub mod geo;
pub mod motion;
pub mod time;
pub mod types;

pub use error::{TrackError, TrackResult};
pub use motion::Velocity;
pub use types::{
    BalloonStatus, PredictedPosition, PredictionMethod, RawObservation, Snapshot, SnapshotMeta,
    TrackedPosition, WindVector,
};
