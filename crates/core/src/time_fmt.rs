// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! UTC timestamp formatting shared by the log writer and the event logger.

use chrono::{DateTime, Utc};

/// Format a timestamp the way every log line in this system is stamped:
/// `2026-01-30T08:14:09.123456Z`.
pub fn format_iso8601_utc(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Format the current time the way [`format_iso8601_utc`] does.
pub fn format_utc_now() -> String {
    format_iso8601_utc(Utc::now())
}

/// The `${unique}` token: `YYYY-MM-DD-HHMMSS-uuuuuu-UTC`.
pub fn unique_token(ts: DateTime<Utc>) -> String {
    format!(
        "{}-{:06}-UTC",
        ts.format("%Y-%m-%d-%H%M%S"),
        ts.timestamp_subsec_micros()
    )
}

/// Format seconds as a short human-readable duration: `"5s"`, `"2m"`, `"1h30m"`, `"3d"`.
///
/// For the hours range, minutes are included when non-zero (e.g. `"1h"` vs `"1h5m"`).
pub fn format_elapsed(secs: u64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else if secs < 86400 {
        let h = secs / 3600;
        let m = (secs % 3600) / 60;
        if m > 0 {
            format!("{}h{}m", h, m)
        } else {
            format!("{}h", h)
        }
    } else {
        format!("{}d", secs / 86400)
    }
}

/// Format milliseconds as a short human-readable duration.
///
/// Convenience wrapper around [`format_elapsed`].
pub fn format_elapsed_ms(ms: u64) -> String {
    format_elapsed(ms / 1000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn unique_token_matches_template() {
        let ts = Utc.with_ymd_and_hms(2026, 1, 30, 8, 14, 9).unwrap()
            + chrono::Duration::microseconds(123456);
        assert_eq!(unique_token(ts), "2026-01-30-081409-123456-UTC");
    }

    #[test]
    fn iso8601_has_trailing_z() {
        let ts = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        assert!(format_iso8601_utc(ts).ends_with('Z'));
    }

    #[yare::parameterized(
        five_seconds     = { 5,      "5s" },
        two_minutes      = { 125,    "2m" },
        one_hour         = { 3600,   "1h" },
        hour_and_minutes = { 5400,   "1h30m" },
        two_days         = { 172800, "2d" },
    )]
    fn elapsed(secs: u64, expected: &str) {
        assert_eq!(format_elapsed(secs), expected);
    }
}
