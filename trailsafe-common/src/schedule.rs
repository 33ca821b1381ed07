// Periodic backup schedule state

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};

use crate::preferences::Preferences;
use crate::settings::{self, BACKUP_FOLDER_PATH_KEY, LAST_BACKUP_TIME_KEY};

/// Decides whether a periodic backup is due and records completed ones
///
/// All state lives in the preference store; the gate itself only remembers
/// whether it has already been consulted during this process lifetime.
pub struct ScheduleGate {
    prefs: Arc<dyn Preferences>,
    already_checked: AtomicBool,
}

impl ScheduleGate {
    pub fn new(prefs: Arc<dyn Preferences>) -> Self {
        Self {
            prefs,
            already_checked: AtomicBool::new(false),
        }
    }

    pub fn preferences(&self) -> &Arc<dyn Preferences> {
        &self.prefs
    }

    /// Whether a backup should run at `now_ms` (epoch milliseconds)
    ///
    /// Always false while periodic backups are disabled (interval of zero).
    pub fn is_due(&self, now_ms: i64) -> bool {
        let interval_ms = self.interval_ms();
        if interval_ms <= 0 {
            return false;
        }

        let last_backup_ms = self.last_backup_time_ms();
        self.already_checked.store(true, Ordering::Relaxed);

        now_ms.saturating_sub(last_backup_ms) >= interval_ms
    }

    /// Whether [`is_due`](Self::is_due) has evaluated an enabled schedule yet
    pub fn is_already_checked(&self) -> bool {
        self.already_checked.load(Ordering::Relaxed)
    }

    /// Milliseconds from `now_ms` until the next backup is due
    ///
    /// Zero or negative once due. Saturates instead of overflowing for very
    /// long intervals.
    pub fn remaining_ms(&self, now_ms: i64) -> i64 {
        self.last_backup_time_ms()
            .saturating_add(self.interval_ms())
            .saturating_sub(now_ms)
    }

    /// Remember `now_ms` as the time of the last successful backup
    ///
    /// Only call this once a backup run has finished successfully.
    pub fn record_success(&self, now_ms: i64) -> Result<()> {
        self.prefs
            .put_i64(LAST_BACKUP_TIME_KEY, now_ms)
            .context("Failed to record last backup time")
    }

    /// Forget the last backup time, making the next check due immediately
    pub fn reset_last_backup_time(&self) -> Result<()> {
        self.prefs
            .remove(LAST_BACKUP_TIME_KEY)
            .context("Failed to reset last backup time")
    }

    /// Epoch milliseconds of the last successful backup, `0` if none
    pub fn last_backup_time_ms(&self) -> i64 {
        self.prefs.get_i64(LAST_BACKUP_TIME_KEY, 0)
    }

    pub fn interval_ms(&self) -> i64 {
        settings::read_interval_ms(self.prefs.as_ref()).value
    }

    pub fn max_backups(&self) -> u32 {
        settings::read_max_backups(self.prefs.as_ref()).value
    }

    /// Stored backup location, `None` if unset or empty
    pub fn folder_path(&self) -> Option<String> {
        self.prefs
            .get_string(BACKUP_FOLDER_PATH_KEY)
            .filter(|path| !path.trim().is_empty())
    }
}
