//! Periodic backups
//!
//! Glue between the schedule stored in the preferences and the backup
//! manager. Used by the scheduler service and by the manual backup action.

use std::sync::Arc;

use anyhow::Result;
use rayon::ThreadPool;
use trailsafe_common::{
    BackupEvent, Clock, JsonPreferences, ScheduleGate, SystemClock, TrailsafeConfig,
    format_duration_ms,
};

use crate::archive::{ArchiveProducer, KmzArchiveProducer};
use crate::backup_manager::{BackupManager, await_outcome, worker_pool};
use crate::backup_settings::open_location;
use crate::store::BackupStore;

/// Runs one backup at a time into the stored backup location
pub struct PeriodicBackupRunner {
    gate: Arc<ScheduleGate>,
    producer: Arc<dyn ArchiveProducer>,
    clock: Arc<dyn Clock>,
    workers: Arc<ThreadPool>,
}

impl PeriodicBackupRunner {
    pub fn new(
        gate: Arc<ScheduleGate>,
        producer: Arc<dyn ArchiveProducer>,
        clock: Arc<dyn Clock>,
        workers: Arc<ThreadPool>,
    ) -> Self {
        Self {
            gate,
            producer,
            clock,
            workers,
        }
    }

    /// Wire up the preference store, the KMZ producer and the worker pool
    pub fn from_config(config: &TrailsafeConfig) -> Result<Self> {
        let prefs = Arc::new(JsonPreferences::new(&config.preferences_file)?);
        let producer = KmzArchiveProducer::new(&config.bookmarks_dir, &config.cache_dir);

        Ok(Self::new(
            Arc::new(ScheduleGate::new(prefs)),
            Arc::new(producer),
            Arc::new(SystemClock),
            worker_pool(config.worker_threads)?,
        ))
    }

    pub fn gate(&self) -> &Arc<ScheduleGate> {
        &self.gate
    }

    /// Whether the configured interval has elapsed since the last backup
    pub fn is_time_to_backup(&self) -> bool {
        let now_ms = self.clock.now_ms();
        let due = self.gate.is_due(now_ms);
        if !due && self.gate.interval_ms() > 0 {
            let remaining = self.gate.remaining_ms(now_ms);
            log::debug!("Next backup due in {}", format_duration_ms(remaining));
        }
        due
    }

    /// Run one backup and block until it ends
    ///
    /// Returns the terminal event, or `None` if no usable backup location is
    /// configured. The backup time is recorded only when the run finished.
    pub fn do_backup(&self) -> Option<BackupEvent> {
        let Some(path) = self.gate.folder_path() else {
            log::warn!("Backup folder is not configured, skipping backup");
            return None;
        };
        let Some(root) = open_location(&path) else {
            log::warn!("Backup folder {} is not available, skipping backup", path);
            return None;
        };

        let (sender, events) = async_channel::unbounded();
        let mut manager = BackupManager::new(
            Arc::new(root),
            BackupStore::new(self.gate.max_backups()),
            self.producer.clone(),
            self.clock.clone(),
            self.workers.clone(),
        );
        manager.set_listener(sender);

        if let Err(e) = manager.do_backup() {
            log::error!("Failed to start backup: {:#}", e);
            return None;
        }
        // Only the running copy may keep the channel open
        drop(manager);

        let outcome = await_outcome(&events, |event| log::info!("Backup progress: {:?}", event))?;

        match outcome {
            BackupEvent::Finished => {
                if let Err(e) = self.gate.record_success(self.clock.now_ms()) {
                    log::error!("{:#}", e);
                }
                log::info!("Backup to {} finished", path);
            }
            BackupEvent::Failed(kind) if kind.is_fault() => {
                log::error!("Backup to {} failed: {}", path, kind);
            }
            BackupEvent::Failed(kind) => log::info!("Backup skipped: {}", kind),
            BackupEvent::Started => {}
        }
        Some(outcome)
    }
}
