//! Wind client for the external atmospheric provider.

pub mod client;
pub mod pressure;

pub use client::{
    bind_closest_hour, build_request_url, frame_days, parse_provider_response,
    wind_components_ms, HourlySeries, WindClient, WindFetcher, WindQuery,
};
pub use pressure::{
    altitude_for_pressure, barometric_pressure_hpa, pressure_level_for_altitude,
    PRESSURE_LEVELS_HPA,
};
