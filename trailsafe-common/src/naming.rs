//! Timestamp-based names for backup folders and archives
//!
//! A backup lives in `backup_<timestamp>/backup_<timestamp>.kmz`. The timestamp
//! is zero-padded and ordered from most to least significant field, so sorting
//! names as strings sorts backups from oldest to newest.

use chrono::NaiveDateTime;

/// Prefix shared by every backup folder and archive
pub const BACKUP_PREFIX: &str = "backup_";

/// Extension of the archive stored in each backup folder
pub const BACKUP_EXTENSION: &str = ".kmz";

/// `yyyy-MM-dd_HH-mm-ss`, resolution of one second
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

fn format_timestamp(time: NaiveDateTime) -> String {
    time.format(TIMESTAMP_FORMAT).to_string()
}

/// Name of the folder holding the backup taken at `time`
pub fn folder_name(time: NaiveDateTime) -> String {
    format!("{BACKUP_PREFIX}{}", format_timestamp(time))
}

/// Name of the archive file for the backup taken at `time`
pub fn file_name(time: NaiveDateTime) -> String {
    format!("{BACKUP_PREFIX}{}{BACKUP_EXTENSION}", format_timestamp(time))
}

/// Whether `name` looks like a folder created by [`folder_name`]
pub fn is_backup_folder(name: &str) -> bool {
    name.starts_with(BACKUP_PREFIX)
}

/// Recover the timestamp encoded in a backup folder name
///
/// Returns `None` for names that carry the prefix but not a valid timestamp,
/// e.g. folders a user created by hand.
pub fn parse_timestamp(name: &str) -> Option<NaiveDateTime> {
    let stamp = name.strip_prefix(BACKUP_PREFIX)?;
    let stamp = stamp.strip_suffix(BACKUP_EXTENSION).unwrap_or(stamp);
    NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()
}
