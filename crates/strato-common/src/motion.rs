//! Velocity smoothing over a balloon's recent track segments.

use serde::{Deserialize, Serialize};

use crate::geo::circular_mean_deg;

/// Horizontal velocity of one track segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Velocity {
    pub speed_kmh: f64,
    pub heading_deg: f64,
}

impl Velocity {
    pub fn new(speed_kmh: f64, heading_deg: f64) -> Self {
        Self { speed_kmh, heading_deg }
    }
}

/// Smooth the most recent up-to-three segments, newest weighted heaviest
/// (weights 1, 2, 3 chronologically). Speed is the weighted arithmetic mean,
/// heading the weighted circular mean.
pub fn smoothed_velocity(segments: &[Velocity]) -> Option<Velocity> {
    if segments.is_empty() {
        return None;
    }
    let recent = &segments[segments.len().saturating_sub(3)..];

    let mut speed_sum = 0.0;
    let mut weight_sum = 0.0;
    let mut headings = Vec::with_capacity(recent.len());
    for (i, seg) in recent.iter().enumerate() {
        let w = (i + 1) as f64;
        speed_sum += w * seg.speed_kmh;
        weight_sum += w;
        headings.push((seg.heading_deg, w));
    }

    let heading = circular_mean_deg(&headings)?;
    Some(Velocity::new(speed_sum / weight_sum, heading))
}
