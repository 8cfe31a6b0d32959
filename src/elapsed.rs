//! Elapsed-time arithmetic and formatting. Pure functions, no state.

use crate::types::EpochMs;

/// Fallback for compact formatting of an empty duration
pub const COMPACT_FALLBACK: &str = "00:00";
/// Fallback for unit formatting of an empty duration
pub const UNITS_FALLBACK: &str = "N/A";

/// Duration between `start` and `end`, or `now` when there is no usable end.
///
/// An `end` that is present and after `start` freezes the result.
/// A non-positive `start` means "not started" and yields 0.
pub fn elapsed(start: EpochMs, end: Option<EpochMs>, now: EpochMs) -> i64 {
    match end {
        Some(end) if end > start => end - start,
        _ if start > 0 => now - start,
        _ => 0,
    }
}

fn split(duration_ms: i64) -> (i64, i64, i64) {
    let total_seconds = duration_ms / 1000;
    (
        total_seconds / 3600,
        (total_seconds % 3600) / 60,
        total_seconds % 60,
    )
}

/// `MM:SS`, or `HH:MM:SS` once the duration reaches an hour (or `include_hours`).
pub fn format_compact_with(duration_ms: i64, include_hours: bool, fallback: &str) -> String {
    if duration_ms <= 0 {
        return fallback.to_string();
    }
    let (hours, minutes, seconds) = split(duration_ms);
    if include_hours || hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

pub fn format_compact(duration_ms: i64) -> String {
    format_compact_with(duration_ms, false, COMPACT_FALLBACK)
}

/// `Ns`, `Nm Ns` or `Nh Nm Ns`
pub fn format_units_with(duration_ms: i64, fallback: &str) -> String {
    if duration_ms <= 0 {
        return fallback.to_string();
    }
    let (hours, minutes, seconds) = split(duration_ms);
    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

pub fn format_units(duration_ms: i64) -> String {
    format_units_with(duration_ms, UNITS_FALLBACK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_durations_use_fallback() {
        assert_eq!(format_compact(0), "00:00");
        assert_eq!(format_compact(-5_000), "00:00");
        assert_eq!(format_units(0), "N/A");
        assert_eq!(format_units(-1), "N/A");
        assert_eq!(format_compact_with(0, false, "--"), "--");
    }

    #[test]
    fn test_compact_format() {
        assert_eq!(format_compact(65_000), "01:05");
        assert_eq!(format_compact(3_600_000), "01:00:00");
        assert_eq!(format_compact(3_661_999), "01:01:01");
        assert_eq!(format_compact_with(65_000, true, COMPACT_FALLBACK), "00:01:05");
    }

    #[test]
    fn test_units_format() {
        assert_eq!(format_units(65_000), "1m 5s");
        assert_eq!(format_units(9_400), "9s");
        assert_eq!(format_units(3_725_000), "1h 2m 5s");
    }

    #[test]
    fn test_elapsed_frozen_by_end() {
        assert_eq!(elapsed(1_000, Some(4_000), 10_000), 3_000);
        // Wall clock moving on does not change a frozen duration
        assert_eq!(elapsed(1_000, Some(4_000), 99_999_999), 3_000);
    }

    #[test]
    fn test_elapsed_live_and_unstarted() {
        assert_eq!(elapsed(1_000, None, 6_000), 5_000);
        // End before start is ignored
        assert_eq!(elapsed(1_000, Some(500), 6_000), 5_000);
        assert_eq!(elapsed(0, None, 6_000), 0);
    }
}
