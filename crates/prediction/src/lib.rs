//! Trajectory prediction and value scoring.

pub mod models;
pub mod scoring;

pub use models::{trajectory_velocity, Predictor};
pub use scoring::{score, HourPrediction, ScoredPoint, ValueScore};
