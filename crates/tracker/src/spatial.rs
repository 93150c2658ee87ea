//! Degree-bucket spatial index over previous-hour positions.
//!
//! Buckets are 1 degree square. The candidate query walks every bucket
//! inside a fixed-half-width bounding box, wrapping longitude at the
//! antimeridian. Box sizes here are ~8 degrees, so a query touches a few
//! hundred buckets at most.

use std::collections::HashMap;

/// Index from 1-degree cells to point indexes.
pub struct GridIndex {
    buckets: HashMap<(i32, i32), Vec<usize>>,
}

impl GridIndex {
    pub fn build(points: impl Iterator<Item = (f64, f64)>) -> Self {
        let mut buckets: HashMap<(i32, i32), Vec<usize>> = HashMap::new();
        for (i, (lat, lon)) in points.enumerate() {
            buckets.entry(cell(lat, lon)).or_default().push(i);
        }
        Self { buckets }
    }

    /// Indexes of all points within a `half_width_deg` box around the query.
    pub fn query(&self, lat: f64, lon: f64, half_width_deg: f64) -> Vec<usize> {
        let mut result = Vec::new();

        let lat_lo = ((lat - half_width_deg).floor() as i32).max(-90);
        let lat_hi = ((lat + half_width_deg).floor() as i32).min(89);

        let lon_lo = (lon - half_width_deg).floor() as i32;
        let lon_span = ((half_width_deg * 2.0).ceil() as i32).min(359);

        for lat_b in lat_lo..=lat_hi {
            for k in 0..=lon_span {
                let lon_b = wrap_lon_cell(lon_lo + k);
                if let Some(indexes) = self.buckets.get(&(lat_b, lon_b)) {
                    result.extend_from_slice(indexes);
                }
            }
        }

        result
    }
}

fn cell(lat: f64, lon: f64) -> (i32, i32) {
    (
        (lat.floor() as i32).clamp(-90, 89),
        wrap_lon_cell(lon.floor() as i32),
    )
}

fn wrap_lon_cell(lon: i32) -> i32 {
    let mut l = (lon + 180).rem_euclid(360);
    if l < 0 {
        l += 360;
    }
    l - 180
}
