//! Altitude to pressure-level mapping.
//!
//! The wind provider serves winds on a fixed ladder of isobaric levels.
//! Altitudes are converted with the barometric approximation
//! `P = P0 * exp(-h / H)` and snapped to the nearest supported rung.

/// Supported isobaric levels, hPa.
pub const PRESSURE_LEVELS_HPA: [u32; 19] = [
    1000, 975, 950, 925, 900, 850, 800, 700, 600, 500, 400, 300, 250, 200, 150, 100, 70, 50, 30,
];

const P0_HPA: f64 = 1013.25;
const SCALE_HEIGHT_KM: f64 = 7.4;

/// Barometric pressure at an altitude, hPa.
pub fn barometric_pressure_hpa(alt_km: f64) -> f64 {
    P0_HPA * (-alt_km / SCALE_HEIGHT_KM).exp()
}

/// Nearest supported pressure level for an altitude.
pub fn pressure_level_for_altitude(alt_km: f64) -> u32 {
    let p = barometric_pressure_hpa(alt_km);
    PRESSURE_LEVELS_HPA
        .iter()
        .copied()
        .min_by(|a, b| {
            (f64::from(*a) - p)
                .abs()
                .total_cmp(&(f64::from(*b) - p).abs())
        })
        .unwrap_or(1000)
}

/// Approximate altitude of a pressure level, km.
pub fn altitude_for_pressure(pressure_hpa: f64) -> f64 {
    -SCALE_HEIGHT_KM * (pressure_hpa / P0_HPA).ln()
}
