//! Backup folders inside the user-granted location
//!
//! Every backup attempt gets its own `backup_<timestamp>` folder holding one
//! archive. After each attempt, successful or not, old folders beyond the
//! retention limit are deleted.

use std::io::{self, Read, Write};

use chrono::NaiveDateTime;
use trailsafe_common::{ErrorKind, RetentionPolicy, naming};

use crate::folder::DocumentHandle;

/// Why saving a backup failed
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("backup location {0} is not writable")]
    NotWritable(String),

    #[error("failed to create backup folder {name}: {source}")]
    CreateFolder {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to create backup file {name}: {source}")]
    CreateFile {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to copy archive into {name}: {source}")]
    Copy {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to read prepared archive: {0}")]
    ReadArchive(#[source] io::Error),
}

impl StoreError {
    /// Every storage failure is reported to listeners as a file error
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::FileError
    }
}

/// What a retention pass did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    /// Identities of the deleted backup folders
    pub deleted: Vec<String>,
    /// Identities of the folders that could not be deleted
    pub failed: Vec<String>,
}

/// Writes backups into a location and keeps their number bounded
#[derive(Debug, Clone, Copy)]
pub struct BackupStore {
    policy: RetentionPolicy,
}

impl BackupStore {
    pub fn new(max_backups: u32) -> Self {
        Self {
            policy: RetentionPolicy::new(max_backups),
        }
    }

    /// Save `archive` as the backup taken at `time`, then apply retention
    ///
    /// Retention runs whether or not the save succeeded, and its own
    /// failures never replace the save result.
    pub fn save(
        &self,
        root: &dyn DocumentHandle,
        time: NaiveDateTime,
        archive: &mut dyn Read,
        mime_type: &str,
    ) -> Result<Box<dyn DocumentHandle>, StoreError> {
        let saved = self.write_backup(root, time, archive, mime_type);
        self.clean_old_backups(root);
        saved
    }

    fn write_backup(
        &self,
        root: &dyn DocumentHandle,
        time: NaiveDateTime,
        archive: &mut dyn Read,
        mime_type: &str,
    ) -> Result<Box<dyn DocumentHandle>, StoreError> {
        if !root.can_write() {
            return Err(StoreError::NotWritable(root.uri()));
        }

        let folder_name = naming::folder_name(time);
        let folder = root
            .create_directory(&folder_name)
            .map_err(|source| StoreError::CreateFolder {
                name: folder_name.clone(),
                source,
            })?;

        let file_name = naming::file_name(time);
        let written = folder
            .create_file(mime_type, &file_name)
            .map_err(|source| StoreError::CreateFile {
                name: file_name.clone(),
                source,
            })
            .and_then(|file| {
                copy_into(file.as_ref(), archive)
                    .map(|bytes| (file, bytes))
                    .map_err(|source| StoreError::Copy {
                        name: file_name.clone(),
                        source,
                    })
            });

        match written {
            Ok((file, bytes)) => {
                log::info!("Backup saved to {} ({} bytes)", file.uri(), bytes);
                Ok(folder)
            }
            Err(e) => {
                if let Err(cleanup) = folder.delete_recursive() {
                    log::warn!(
                        "Failed to remove incomplete backup folder {}: {}",
                        folder.uri(),
                        cleanup
                    );
                }
                Err(e)
            }
        }
    }

    /// Backup folders directly inside `root`, oldest first
    pub fn list_backups(root: &dyn DocumentHandle) -> io::Result<Vec<Box<dyn DocumentHandle>>> {
        let mut backups: Vec<Box<dyn DocumentHandle>> = root
            .list_children()?
            .into_iter()
            .filter(|child| {
                child.is_directory()
                    && child
                        .name()
                        .is_some_and(|name| naming::is_backup_folder(&name))
            })
            .collect();
        backups.sort_by_cached_key(|folder| folder.name().unwrap_or_default());
        Ok(backups)
    }

    /// Delete the oldest backup folders beyond the retention limit
    ///
    /// Each candidate is attempted once. A failed deletion is logged and does
    /// not stop the others.
    pub fn clean_old_backups(&self, root: &dyn DocumentHandle) -> CleanupReport {
        let mut report = CleanupReport::default();

        let backups = match Self::list_backups(root) {
            Ok(backups) => backups,
            Err(e) => {
                log::error!("Failed to list backups in {}: {}", root.uri(), e);
                return report;
            }
        };

        let to_delete = self
            .policy
            .select_for_eviction(backups, |folder| folder.name().unwrap_or_default());

        for folder in to_delete {
            let uri = folder.uri();
            log::info!("Delete old backup {}", uri);
            match folder.delete_recursive() {
                Ok(()) => report.deleted.push(uri),
                Err(e) => {
                    log::error!("Failed to delete old backup {}: {}", uri, e);
                    report.failed.push(uri);
                }
            }
        }

        report
    }
}

fn copy_into(file: &dyn DocumentHandle, archive: &mut dyn Read) -> io::Result<u64> {
    let mut writer = file.open_writer()?;
    let bytes = io::copy(archive, &mut writer)?;
    writer.flush()?;
    Ok(bytes)
}
