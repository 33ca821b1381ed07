//! Trailsafe: local bookmark backups with bounded retention

pub mod archive;
pub mod backup_manager;
pub mod backup_settings;
pub mod folder;
pub mod periodic;
pub mod store;

#[cfg(test)]
mod testing;

pub use archive::{ArchiveProducer, KmzArchiveProducer};
pub use backup_manager::{BackupManager, BackupState, await_outcome, worker_pool};
pub use backup_settings::{BackupSettings, LocationStatus};
pub use folder::{DocumentHandle, LocalDocument};
pub use periodic::PeriodicBackupRunner;
pub use store::{BackupStore, CleanupReport, StoreError};
