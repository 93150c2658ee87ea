//! Wall-clock tick scheduling.
//!
//! Ticks fire at the next hour boundary plus 90 seconds; the offset absorbs
//! upstream publish latency. Hosts without wall-clock scheduling call
//! `IngestController::trigger_once` themselves.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tracing::{error, info};

use strato_common::time::truncate_to_hour;

use crate::controller::IngestController;

/// Seconds past the hour at which a tick fires.
pub const TICK_OFFSET_SECS: i64 = 90;

/// Delay until the next hh:01:30 tick.
pub fn next_tick_delay(now: DateTime<Utc>) -> Duration {
    let this_tick = truncate_to_hour(now) + ChronoDuration::seconds(TICK_OFFSET_SECS);
    let next = if now < this_tick {
        this_tick
    } else {
        this_tick + ChronoDuration::hours(1)
    };
    (next - now).to_std().unwrap_or(Duration::from_secs(1))
}

/// Drive the controller forever on the hourly schedule.
pub async fn run_forever(controller: Arc<IngestController>) {
    loop {
        let delay = next_tick_delay(Utc::now());
        info!(delay_secs = delay.as_secs(), "Sleeping until next tick");
        tokio::time::sleep(delay).await;

        match controller.trigger_once().await {
            Ok(report) => {
                if !report.no_op {
                    info!(
                        hour = %report.hour,
                        tracked = report.balloons_tracked,
                        rebuilt = report.rebuilt,
                        "Tick complete"
                    );
                }
            }
            Err(e) => error!(error = %e, "Tick failed"),
        }
    }
}
