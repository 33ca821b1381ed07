// Shared types and utilities for Trailsafe

pub mod clock;
pub mod config;
pub mod format;
pub mod naming;
pub mod preferences;
pub mod retention;
pub mod schedule;
pub mod settings;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::TrailsafeConfig;
pub use format::{describe_interval, format_backup_time, format_duration_ms};
pub use preferences::{JsonPreferences, MemoryPreferences, Preferences};
pub use retention::{MAX_BACKUPS_DEFAULT_COUNT, RetentionPolicy};
pub use schedule::ScheduleGate;
pub use settings::{Healed, IntervalPreset};

/// Why a backup run failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum ErrorKind {
    /// There were no bookmarks to back up
    #[error("nothing to back up")]
    EmptyCategory,
    /// Building the archive failed
    #[error("failed to create the bookmarks archive")]
    ArchiveError,
    /// Creating, writing or copying a file in the backup location failed
    #[error("failed to write the backup")]
    FileError,
    /// The archive producer returned a result we do not know
    #[error("unsupported archive result")]
    Unsupported,
}

impl ErrorKind {
    /// Whether this is a real fault rather than an informational state
    ///
    /// An empty bookmark collection is reported neutrally; every other kind
    /// is an error the user may want to investigate.
    pub fn is_fault(&self) -> bool {
        !matches!(self, ErrorKind::EmptyCategory)
    }

    /// Message shown to the user for this failure
    pub fn user_message(&self) -> String {
        if self.is_fault() {
            format!("Backup failed: {self}. See the log for details.")
        } else {
            "Nothing to back up: there are no bookmark lists yet.".to_string()
        }
    }
}

/// Progress notification of one backup run
///
/// `Started` comes first; exactly one of `Finished` or `Failed` ends the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupEvent {
    Started,
    Finished,
    Failed(ErrorKind),
}

impl BackupEvent {
    /// Whether this event ends the run
    pub fn is_terminal(&self) -> bool {
        !matches!(self, BackupEvent::Started)
    }
}
