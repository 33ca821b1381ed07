//! Backup settings actions: location, schedule, retention and "backup now"

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use trailsafe_common::settings::{BACKUP_FOLDER_PATH_KEY, BACKUP_INTERVAL_KEY, MAX_BACKUPS_KEY};
use trailsafe_common::{BackupEvent, Preferences, ScheduleGate, describe_interval, format_backup_time};

use crate::folder::{DocumentHandle, LocalDocument};
use crate::periodic::PeriodicBackupRunner;

/// Whether backups can currently be written
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocationStatus {
    NotConfigured,
    /// Configured, but missing or not writable (e.g. an unplugged drive)
    Unavailable(String),
    Ready(String),
}

impl LocationStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, LocationStatus::Ready(_))
    }
}

/// Open a stored backup location if it is an existing writable folder
pub fn open_location(path: &str) -> Option<LocalDocument> {
    match LocalDocument::open(path) {
        Ok(root) if root.can_write() => Some(root),
        Ok(_) => {
            log::debug!("Backup location {} is read-only", path);
            None
        }
        Err(e) => {
            log::debug!("Backup location {} cannot be opened: {}", path, e);
            None
        }
    }
}

/// Reads and changes the persisted backup settings
pub struct BackupSettings {
    gate: Arc<ScheduleGate>,
}

impl BackupSettings {
    pub fn new(gate: Arc<ScheduleGate>) -> Self {
        Self { gate }
    }

    fn prefs(&self) -> &dyn Preferences {
        self.gate.preferences().as_ref()
    }

    pub fn location_status(&self) -> LocationStatus {
        match self.gate.folder_path() {
            None => LocationStatus::NotConfigured,
            Some(path) if open_location(&path).is_some() => LocationStatus::Ready(path),
            Some(path) => LocationStatus::Unavailable(path),
        }
    }

    /// Use `dir` as the backup location
    ///
    /// Every selection resets the last backup time, so the next periodic
    /// check backs up right away. See [`choose_location`](Self::choose_location)
    /// to also back up immediately.
    pub fn set_location(&self, dir: &Path) -> Result<PathBuf> {
        let dir = fs::canonicalize(dir)
            .with_context(|| format!("Backup folder {} does not exist", dir.display()))?;
        let path = dir
            .to_str()
            .with_context(|| format!("Backup folder {} is not valid UTF-8", dir.display()))?;

        let Some(root) = open_location(path) else {
            anyhow::bail!("Backup folder {} is not a writable directory", path);
        };

        self.prefs()
            .put_string(BACKUP_FOLDER_PATH_KEY, path)
            .context("Failed to save backup folder")?;
        self.gate.reset_last_backup_time()?;
        log::info!("Backup folder set to {}", root.uri());
        Ok(dir)
    }

    /// Select `dir` as the backup location and back up into it right away
    pub fn choose_location(
        &self,
        dir: &Path,
        runner: &PeriodicBackupRunner,
    ) -> Result<(PathBuf, BackupEvent)> {
        let dir = self.set_location(dir)?;
        let outcome = self.run_backup(runner)?;
        Ok((dir, outcome))
    }

    pub fn clear_location(&self) -> Result<()> {
        self.prefs()
            .remove(BACKUP_FOLDER_PATH_KEY)
            .context("Failed to clear backup folder")?;
        log::info!("Backup folder cleared, backups are off");
        Ok(())
    }

    /// Set the periodic backup interval, `0` turns periodic backups off
    pub fn set_interval(&self, interval_ms: i64) -> Result<()> {
        if interval_ms < 0 {
            anyhow::bail!("Backup interval cannot be negative");
        }
        self.prefs()
            .put_i64(BACKUP_INTERVAL_KEY, interval_ms)
            .context("Failed to save backup interval")?;
        log::info!("Backup interval set to {}", describe_interval(interval_ms));
        Ok(())
    }

    pub fn set_max_backups(&self, max_backups: u32) -> Result<()> {
        if max_backups == 0 {
            anyhow::bail!("At least one backup has to be kept");
        }
        self.prefs()
            .put_i64(MAX_BACKUPS_KEY, i64::from(max_backups))
            .context("Failed to save maximum number of backups")?;
        log::info!("Keeping up to {} backups", max_backups);
        Ok(())
    }

    /// One-line description of the last backup
    pub fn status_summary(&self) -> String {
        match self.gate.last_backup_time_ms() {
            last if last > 0 => format!("Last backup: {}", format_backup_time(last)),
            _ => "No backups yet".to_string(),
        }
    }

    /// Back up now, regardless of the schedule
    pub fn run_backup(&self, runner: &PeriodicBackupRunner) -> Result<BackupEvent> {
        match self.location_status() {
            LocationStatus::Ready(_) => {}
            LocationStatus::NotConfigured => anyhow::bail!("No backup folder is configured"),
            LocationStatus::Unavailable(path) => {
                anyhow::bail!("Backup folder {} is not available", path)
            }
        }

        runner.do_backup().context("Backup did not complete")
    }
}
