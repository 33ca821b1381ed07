//! Backup manager for running one backup end to end
//!
//! Handles:
//! - Requesting an archive of the bookmark collection
//! - Saving the prepared archive into the backup location
//! - Applying retention after every attempt
//! - Reporting progress to a listener

use anyhow::{Context, Result};
use async_channel::{Receiver, Sender};
use rayon::ThreadPool;
use std::fs::File;
use std::sync::{Arc, Mutex, MutexGuard};
use trailsafe_common::{BackupEvent, Clock, ErrorKind};

use crate::archive::{
    ArchiveProducer, KmlFileType, PendingArchive, SharingResult, SharingResultCode, archive_channel,
};
use crate::folder::DocumentHandle;
use crate::store::{BackupStore, StoreError};

/// Where a backup run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackupState {
    #[default]
    Idle,
    /// Waiting for the producer to prepare the archive
    AwaitingArchive,
    /// Copying the archive into the backup location
    Saving,
    Finished,
    Failed(ErrorKind),
}

impl BackupState {
    pub fn is_in_flight(&self) -> bool {
        matches!(self, BackupState::AwaitingArchive | BackupState::Saving)
    }
}

/// Runs backups into one backup location
#[derive(Clone)]
pub struct BackupManager {
    root: Arc<dyn DocumentHandle>,
    store: BackupStore,
    producer: Arc<dyn ArchiveProducer>,
    clock: Arc<dyn Clock>,
    workers: Arc<ThreadPool>,
    listener: Option<Sender<BackupEvent>>,
    state: Arc<Mutex<BackupState>>,
}

impl BackupManager {
    pub fn new(
        root: Arc<dyn DocumentHandle>,
        store: BackupStore,
        producer: Arc<dyn ArchiveProducer>,
        clock: Arc<dyn Clock>,
        workers: Arc<ThreadPool>,
    ) -> Self {
        Self {
            root,
            store,
            producer,
            clock,
            workers,
            listener: None,
            state: Arc::new(Mutex::new(BackupState::Idle)),
        }
    }

    /// Send progress events of future runs to `listener`
    pub fn set_listener(&mut self, listener: Sender<BackupEvent>) {
        self.listener = Some(listener);
    }

    pub fn state(&self) -> BackupState {
        *self.lock_state()
    }

    /// Start a backup and return immediately
    ///
    /// `Started` is sent before this returns; the terminal event follows from
    /// a worker thread once the archive has been handled. Fails without
    /// sending anything while another run of this manager is in flight.
    pub fn do_backup(&self) -> Result<()> {
        {
            let mut state = self.lock_state();
            if state.is_in_flight() {
                anyhow::bail!("A backup is already running ({:?})", *state);
            }
            *state = BackupState::AwaitingArchive;
        }

        let categories = self.producer.categories();
        log::info!(
            "Starting backup of {} categories to {}",
            categories.len(),
            self.root.uri()
        );

        let (reply, pending) = archive_channel();
        self.producer.prepare(&categories, KmlFileType::Text, reply);
        self.notify(BackupEvent::Started);

        let run = self.clone();
        self.workers.spawn(move || run.finish(pending));
        Ok(())
    }

    fn finish(self, pending: PendingArchive) {
        let outcome = match pending.wait() {
            Ok(result) => self.handle_result(result),
            Err(e) => {
                log::error!("Backup aborted: {}", e);
                self.store.clean_old_backups(self.root.as_ref());
                Err(ErrorKind::ArchiveError)
            }
        };

        let (state, event) = match outcome {
            Ok(()) => (BackupState::Finished, BackupEvent::Finished),
            Err(kind) => (BackupState::Failed(kind), BackupEvent::Failed(kind)),
        };
        *self.lock_state() = state;
        self.notify(event);
    }

    fn handle_result(&self, result: SharingResult) -> Result<(), ErrorKind> {
        let kind = match result.code {
            SharingResultCode::Success => {
                *self.lock_state() = BackupState::Saving;
                return self.save(&result).map_err(|e| {
                    log::error!("Failed to save backup: {}", e);
                    e.kind()
                });
            }
            SharingResultCode::EmptyCategory => ErrorKind::EmptyCategory,
            SharingResultCode::ArchiveError => ErrorKind::ArchiveError,
            SharingResultCode::FileError => ErrorKind::FileError,
            SharingResultCode::Other(code) => {
                log::error!("Unknown archive result code {}", code);
                ErrorKind::Unsupported
            }
        };

        log::warn!(
            "Archive preparation failed with {:?}: {}",
            result.code,
            result.error_message.as_deref().unwrap_or("no details")
        );
        self.store.clean_old_backups(self.root.as_ref());
        Err(kind)
    }

    fn save(&self, result: &SharingResult) -> Result<(), StoreError> {
        let time = self.clock.now().naive_local();
        let mut archive = match File::open(&result.sharing_path) {
            Ok(file) => file,
            Err(e) => {
                self.store.clean_old_backups(self.root.as_ref());
                return Err(StoreError::ReadArchive(e));
            }
        };

        self.store
            .save(self.root.as_ref(), time, &mut archive, &result.mime_type)
            .map(|_| ())
    }

    fn notify(&self, event: BackupEvent) {
        if let Some(listener) = &self.listener {
            if listener.try_send(event).is_err() {
                log::warn!("Backup listener is gone, dropping {:?}", event);
            }
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, BackupState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Thread pool running the blocking part of backups
pub fn worker_pool(threads: usize) -> Result<Arc<ThreadPool>> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .thread_name(|i| format!("backup-worker-{i}"))
        .build()
        .context("Failed to start backup worker pool")?;
    Ok(Arc::new(pool))
}

/// Drain `events` on the calling thread until a run ends
///
/// Returns the terminal event, or `None` if every sender went away first.
pub fn await_outcome(
    events: &Receiver<BackupEvent>,
    mut on_event: impl FnMut(BackupEvent),
) -> Option<BackupEvent> {
    while let Ok(event) = events.recv_blocking() {
        on_event(event);
        if event.is_terminal() {
            return Some(event);
        }
    }
    None
}
