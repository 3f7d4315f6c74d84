use std::time::Duration;

use chrono::{DateTime, NaiveDateTime};

/// Ticks per second of every timestamp and duration in the playlist model.
pub const CLOCK_FREQ: i64 = 1_000_000;

/// Saturates at the bounds of `i64`. NaN maps to zero.
pub fn secs_to_ticks(seconds: f64) -> i64 {
    (CLOCK_FREQ as f64 * seconds).round() as i64
}

pub fn ticks_to_duration(ticks: i64) -> Duration {
    Duration::from_micros(ticks.max(0) as u64)
}

/// Parses an `EXT-X-PROGRAM-DATE-TIME` value into microseconds since the UNIX epoch.
pub fn parse_program_date_time(value: &str) -> Option<i64> {
    let value = value.trim();
    if let Ok(time) = DateTime::parse_from_rfc3339(value) {
        return Some(time.timestamp_micros());
    }

    // ISO 8601 offsets without a colon, e.g. +0800
    if let Ok(time) = DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(time.timestamp_micros());
    }

    // Some packagers omit the offset entirely, which is treated as UTC
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|time| time.and_utc().timestamp_micros())
}
