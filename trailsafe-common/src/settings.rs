//! Typed backup settings on top of the preference store
//!
//! Interval and count are stored as strings because users edit them. A value
//! that does not parse is replaced by its default, and the default is written
//! back right away so the store heals itself.

use crate::preferences::Preferences;
use crate::retention::MAX_BACKUPS_DEFAULT_COUNT;

/// Opaque identifier of the user-chosen backup folder
pub const BACKUP_FOLDER_PATH_KEY: &str = "backup_location";

/// Epoch milliseconds of the last successful backup
pub const LAST_BACKUP_TIME_KEY: &str = "last_backup_time";

/// Periodic backup interval in milliseconds, `0` disables periodic backups
pub const BACKUP_INTERVAL_KEY: &str = "backup_history_interval";

/// Number of backups kept in the backup folder
pub const MAX_BACKUPS_KEY: &str = "backup_history_count";

/// Periodic backups are off until the user picks an interval
pub const DEFAULT_BACKUP_INTERVAL_MS: i64 = 0;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// A setting value together with whether it had to be reset to its default
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Healed<T> {
    pub value: T,
    pub was_reset: bool,
}

impl<T> Healed<T> {
    fn stored(value: T) -> Self {
        Self {
            value,
            was_reset: false,
        }
    }

    fn reset(value: T) -> Self {
        Self {
            value,
            was_reset: true,
        }
    }
}

/// Read the maximum number of backups to keep
///
/// Anything other than a positive integer is reset to
/// [`MAX_BACKUPS_DEFAULT_COUNT`].
pub fn read_max_backups(prefs: &dyn Preferences) -> Healed<u32> {
    let Some(raw) = prefs.get_string(MAX_BACKUPS_KEY) else {
        return Healed::stored(MAX_BACKUPS_DEFAULT_COUNT);
    };

    match raw.trim().parse::<u32>() {
        Ok(count) if count > 0 => Healed::stored(count),
        _ => {
            log::error!(
                "Failed to parse max backups count, raw value: {:?}, set to default: {}",
                raw,
                MAX_BACKUPS_DEFAULT_COUNT
            );
            write_back(prefs, MAX_BACKUPS_KEY, &MAX_BACKUPS_DEFAULT_COUNT.to_string());
            Healed::reset(MAX_BACKUPS_DEFAULT_COUNT)
        }
    }
}

/// Read the periodic backup interval in milliseconds
///
/// Anything other than a non-negative integer is reset to
/// [`DEFAULT_BACKUP_INTERVAL_MS`], which disables periodic backups.
pub fn read_interval_ms(prefs: &dyn Preferences) -> Healed<i64> {
    let Some(raw) = prefs.get_string(BACKUP_INTERVAL_KEY) else {
        return Healed::stored(DEFAULT_BACKUP_INTERVAL_MS);
    };

    match raw.trim().parse::<i64>() {
        Ok(interval) if interval >= 0 => Healed::stored(interval),
        _ => {
            log::error!(
                "Failed to parse backup interval, raw value: {:?}, set to default: {}",
                raw,
                DEFAULT_BACKUP_INTERVAL_MS
            );
            write_back(prefs, BACKUP_INTERVAL_KEY, &DEFAULT_BACKUP_INTERVAL_MS.to_string());
            Healed::reset(DEFAULT_BACKUP_INTERVAL_MS)
        }
    }
}

fn write_back(prefs: &dyn Preferences, key: &str, value: &str) {
    if let Err(e) = prefs.put_string(key, value) {
        log::warn!("Failed to persist default for {}: {:#}", key, e);
    }
}

/// Standard periodic backup cadences
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalPreset {
    Off,
    Daily,
    Weekly,
    Monthly,
}

impl IntervalPreset {
    pub const ALL: [IntervalPreset; 4] = [
        IntervalPreset::Off,
        IntervalPreset::Daily,
        IntervalPreset::Weekly,
        IntervalPreset::Monthly,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            IntervalPreset::Off => "off",
            IntervalPreset::Daily => "daily",
            IntervalPreset::Weekly => "weekly",
            IntervalPreset::Monthly => "monthly",
        }
    }

    pub fn millis(&self) -> i64 {
        match self {
            IntervalPreset::Off => 0,
            IntervalPreset::Daily => DAY_MS,
            IntervalPreset::Weekly => 7 * DAY_MS,
            IntervalPreset::Monthly => 30 * DAY_MS,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|preset| preset.as_str().eq_ignore_ascii_case(name))
    }

    /// Preset matching an interval exactly, if any
    pub fn from_millis(millis: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|preset| preset.millis() == millis)
    }
}

/// Parse a user supplied interval: a preset name or a number of milliseconds
pub fn parse_interval(input: &str) -> Result<i64, String> {
    if let Some(preset) = IntervalPreset::from_name(input.trim()) {
        return Ok(preset.millis());
    }

    match input.trim().parse::<i64>() {
        Ok(millis) if millis >= 0 => Ok(millis),
        _ => Err(format!(
            "Invalid interval '{}'. Expected off, daily, weekly, monthly or milliseconds",
            input
        )),
    }
}
