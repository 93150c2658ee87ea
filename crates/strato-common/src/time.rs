//! Hour-granular time handling.
//!
//! The upstream feed carries no timestamps; hours are inferred from the
//! caller's wall clock as `now_hour - offset`. Clock drift relative to the
//! upstream publisher can therefore misalign historical hours by up to one
//! hour; `data_age_minutes` in the health report is the trust indicator.

use chrono::{DateTime, Duration, Timelike, Utc};

/// Truncate an instant to the containing UTC hour.
pub fn truncate_to_hour(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.with_minute(0)
        .and_then(|d| d.with_second(0))
        .and_then(|d| d.with_nanosecond(0))
        .unwrap_or(dt)
}

/// The current UTC hour.
pub fn now_hour() -> DateTime<Utc> {
    truncate_to_hour(Utc::now())
}

/// The hour timestamp `offset` hours before `reference`.
pub fn hour_at_offset(reference: DateTime<Utc>, offset: u32) -> DateTime<Utc> {
    reference - Duration::hours(i64::from(offset))
}
