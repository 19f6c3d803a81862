//! Timestamp and elapsed-time utilities

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Convert milliseconds to duration
pub fn millis_to_duration(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

/// Elapsed milliseconds floored to the tick resolution.
///
/// A zero tick disables quantization.
pub fn floor_to_tick(elapsed: Duration, tick_ms: u64) -> u64 {
    let ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
    if tick_ms == 0 {
        ms
    } else {
        ms - ms % tick_ms
    }
}

/// Format milliseconds as seconds with two decimals ("12.34")
pub fn format_seconds(ms: u64) -> String {
    format!("{}.{:02}", ms / 1000, (ms % 1000) / 10)
}
