//! Formatting helpers for intervals and backup times

use chrono::{Local, TimeZone};

use crate::settings::IntervalPreset;

/// Format a duration given in milliseconds as a short human-readable string
///
/// # Examples
/// ```
/// use trailsafe_common::format_duration_ms;
/// assert_eq!(format_duration_ms(30_000), "30s");
/// assert_eq!(format_duration_ms(5_400_000), "1h 30m");
/// assert_eq!(format_duration_ms(90_000_000), "1d 1h");
/// ```
pub fn format_duration_ms(millis: i64) -> String {
    let seconds = millis.max(0) / 1000;

    let (major, major_unit, minor, minor_unit) = if seconds < 60 {
        return format!("{seconds}s");
    } else if seconds < 3600 {
        (seconds / 60, "m", seconds % 60, "s")
    } else if seconds < 86400 {
        (seconds / 3600, "h", (seconds % 3600) / 60, "m")
    } else {
        (seconds / 86400, "d", (seconds % 86400) / 3600, "h")
    };

    if minor == 0 {
        format!("{major}{major_unit}")
    } else {
        format!("{major}{major_unit} {minor}{minor_unit}")
    }
}

/// Describe a configured backup interval
pub fn describe_interval(interval_ms: i64) -> String {
    match IntervalPreset::from_millis(interval_ms) {
        Some(IntervalPreset::Off) => "off".to_string(),
        Some(preset) => preset.as_str().to_string(),
        None if interval_ms <= 0 => "off".to_string(),
        None => format!("every {}", format_duration_ms(interval_ms)),
    }
}

/// Format epoch milliseconds as a local date and time, e.g. `2024-01-12 08:30`
pub fn format_backup_time(epoch_ms: i64) -> String {
    match Local.timestamp_millis_opt(epoch_ms).single() {
        Some(time) => time.format("%Y-%m-%d %H:%M").to_string(),
        None => format!("{epoch_ms} ms"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration_ms() {
        assert_eq!(format_duration_ms(0), "0s");
        assert_eq!(format_duration_ms(-5), "0s");
        assert_eq!(format_duration_ms(999), "0s");
        assert_eq!(format_duration_ms(60_000), "1m");
        assert_eq!(format_duration_ms(90_000), "1m 30s");
        assert_eq!(format_duration_ms(3_600_000), "1h");
        assert_eq!(format_duration_ms(3_665_000), "1h 1m");
        assert_eq!(format_duration_ms(86_400_000), "1d");
        assert_eq!(format_duration_ms(90_000_000), "1d 1h");
    }

    #[test]
    fn test_describe_interval() {
        assert_eq!(describe_interval(0), "off");
        assert_eq!(describe_interval(86_400_000), "daily");
        assert_eq!(describe_interval(604_800_000), "weekly");
        assert_eq!(describe_interval(7_200_000), "every 2h");
    }

    #[test]
    fn test_format_backup_time_shape() {
        let formatted = format_backup_time(1_700_000_000_000);
        assert_eq!(formatted.len(), "2023-11-14 22:13".len());
        assert!(formatted.starts_with("2023-11-1"));
    }
}
