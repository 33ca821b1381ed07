//! Archive preparation
//!
//! An [`ArchiveProducer`] turns the bookmark collection into one shareable
//! file. Preparation is asynchronous: the requester hands over an
//! [`ArchiveReply`] and keeps the matching [`PendingArchive`]. The reply is
//! consumed when used, so each request is answered at most once.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;

use async_channel::{Receiver, Sender};
use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

/// Identifier of a bookmark category (one list of bookmarks)
pub type CategoryId = u64;

/// MIME type of a KMZ archive
pub const KMZ_MIME_TYPE: &str = "application/vnd.google-earth.kmz";

/// Serialization used for the categories inside the archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KmlFileType {
    /// Plain KML text
    Text,
    Gpx,
}

/// Result code reported by an archive producer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SharingResultCode {
    Success,
    EmptyCategory,
    ArchiveError,
    FileError,
    /// A code this version does not know about
    Other(i32),
}

/// Outcome of one archive preparation
#[derive(Debug, Clone)]
pub struct SharingResult {
    pub categories: Vec<CategoryId>,
    pub code: SharingResultCode,
    pub mime_type: String,
    /// Location of the prepared archive; only meaningful on success
    pub sharing_path: PathBuf,
    pub error_message: Option<String>,
}

impl SharingResult {
    pub fn success(
        categories: Vec<CategoryId>,
        mime_type: impl Into<String>,
        sharing_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            categories,
            code: SharingResultCode::Success,
            mime_type: mime_type.into(),
            sharing_path: sharing_path.into(),
            error_message: None,
        }
    }

    pub fn failure(
        categories: Vec<CategoryId>,
        code: SharingResultCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            categories,
            code,
            mime_type: String::new(),
            sharing_path: PathBuf::new(),
            error_message: Some(message.into()),
        }
    }
}

/// Create a connected reply / pending pair for one request
pub fn archive_channel() -> (ArchiveReply, PendingArchive) {
    let (sender, receiver) = async_channel::bounded(1);
    (ArchiveReply { sender }, PendingArchive { receiver })
}

/// Producer side of one archive request
#[derive(Debug)]
pub struct ArchiveReply {
    sender: Sender<SharingResult>,
}

impl ArchiveReply {
    /// Deliver the result of the request
    ///
    /// Dropping the reply without calling this tells the requester the
    /// request was abandoned.
    pub fn send(self, result: SharingResult) {
        if self.sender.try_send(result).is_err() {
            log::warn!("Archive requester is gone, dropping preparation result");
        }
    }
}

/// The producer dropped the request without answering
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("archive producer abandoned the request")]
pub struct ReplyDropped;

/// Requester side of one archive request
#[derive(Debug)]
pub struct PendingArchive {
    receiver: Receiver<SharingResult>,
}

impl PendingArchive {
    /// Block the current thread until the producer answers
    pub fn wait(self) -> Result<SharingResult, ReplyDropped> {
        self.receiver.recv_blocking().map_err(|_| ReplyDropped)
    }

    /// Wait for the producer without blocking a thread
    pub async fn recv(self) -> Result<SharingResult, ReplyDropped> {
        self.receiver.recv().await.map_err(|_| ReplyDropped)
    }
}

/// Source of backup archives
pub trait ArchiveProducer: Send + Sync {
    /// Categories currently in the bookmark collection
    fn categories(&self) -> Vec<CategoryId>;

    /// Start preparing an archive of `categories`
    ///
    /// Must return promptly; the work happens on a thread owned by the
    /// producer, which answers through `reply` exactly once.
    fn prepare(&self, categories: &[CategoryId], format: KmlFileType, reply: ArchiveReply);
}

/// Packs the `.kml` files of a bookmarks directory into a single KMZ archive
///
/// Each `.kml` file is one category. Category ids are positions in the
/// name-sorted listing.
#[derive(Debug, Clone)]
pub struct KmzArchiveProducer {
    bookmarks_dir: PathBuf,
    cache_dir: PathBuf,
}

impl KmzArchiveProducer {
    pub fn new(bookmarks_dir: impl Into<PathBuf>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            bookmarks_dir: bookmarks_dir.into(),
            cache_dir: cache_dir.into(),
        }
    }

    fn category_files(bookmarks_dir: &Path) -> io::Result<Vec<PathBuf>> {
        if !bookmarks_dir.exists() {
            return Ok(Vec::new());
        }

        let mut files: Vec<PathBuf> = fs::read_dir(bookmarks_dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_file()
                    && path
                        .extension()
                        .is_some_and(|ext| ext.eq_ignore_ascii_case("kml"))
            })
            .collect();
        files.sort();
        Ok(files)
    }

    fn build(
        bookmarks_dir: &Path,
        cache_dir: &Path,
        categories: &[CategoryId],
        format: KmlFileType,
    ) -> SharingResult {
        let ids = categories.to_vec();

        if format != KmlFileType::Text {
            return SharingResult::failure(
                ids,
                SharingResultCode::ArchiveError,
                format!("{format:?} export is not supported"),
            );
        }

        let files = match Self::category_files(bookmarks_dir) {
            Ok(files) => files,
            Err(e) => {
                return SharingResult::failure(
                    ids,
                    SharingResultCode::FileError,
                    format!("Failed to list {}: {e}", bookmarks_dir.display()),
                );
            }
        };

        let selected: Vec<&PathBuf> = files
            .iter()
            .enumerate()
            .filter(|(index, _)| categories.contains(&(*index as CategoryId)))
            .map(|(_, path)| path)
            .filter(|path| fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false))
            .collect();

        if selected.is_empty() {
            return SharingResult::failure(
                ids,
                SharingResultCode::EmptyCategory,
                "No bookmarks to export",
            );
        }

        if let Err(e) = fs::create_dir_all(cache_dir) {
            return SharingResult::failure(
                ids,
                SharingResultCode::FileError,
                format!("Failed to create {}: {e}", cache_dir.display()),
            );
        }

        let archive_path = cache_dir.join("bookmarks.kmz");
        let file = match File::create(&archive_path) {
            Ok(file) => file,
            Err(e) => {
                return SharingResult::failure(
                    ids,
                    SharingResultCode::FileError,
                    format!("Failed to create {}: {e}", archive_path.display()),
                );
            }
        };

        match write_kmz(file, &selected) {
            Ok(()) => SharingResult::success(ids, KMZ_MIME_TYPE, archive_path),
            Err(e) => SharingResult::failure(
                ids,
                SharingResultCode::ArchiveError,
                format!("Failed to build archive: {e:#}"),
            ),
        }
    }
}

fn write_kmz(file: File, categories: &[&PathBuf]) -> anyhow::Result<()> {
    let mut zip = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for path in categories {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow::anyhow!("Category file name is not UTF-8: {}", path.display()))?;
        zip.start_file(name, options)?;
        let mut source = File::open(path)?;
        io::copy(&mut source, &mut zip)?;
    }

    zip.finish()?;
    Ok(())
}

impl ArchiveProducer for KmzArchiveProducer {
    fn categories(&self) -> Vec<CategoryId> {
        match Self::category_files(&self.bookmarks_dir) {
            Ok(files) => (0..files.len() as CategoryId).collect(),
            Err(e) => {
                log::warn!(
                    "Failed to list bookmark categories in {}: {}",
                    self.bookmarks_dir.display(),
                    e
                );
                Vec::new()
            }
        }
    }

    fn prepare(&self, categories: &[CategoryId], format: KmlFileType, reply: ArchiveReply) {
        let bookmarks_dir = self.bookmarks_dir.clone();
        let cache_dir = self.cache_dir.clone();
        let categories = categories.to_vec();

        let spawned = thread::Builder::new()
            .name("kmz-export".to_string())
            .spawn(move || {
                let result = Self::build(&bookmarks_dir, &cache_dir, &categories, format);
                if let Some(message) = &result.error_message {
                    log::warn!("Archive preparation failed ({:?}): {}", result.code, message);
                }
                reply.send(result);
            });

        // The closure, and the reply with it, is dropped on failure
        if let Err(e) = spawned {
            log::error!("Failed to start archive preparation: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn write_category(dir: &Path, name: &str, content: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(name), content).unwrap();
    }

    fn prepare(producer: &KmzArchiveProducer, categories: &[CategoryId]) -> SharingResult {
        let (reply, pending) = archive_channel();
        producer.prepare(categories, KmlFileType::Text, reply);
        pending.wait().unwrap()
    }

    #[test]
    fn test_reply_is_delivered_once() {
        let (reply, pending) = archive_channel();
        reply.send(SharingResult::failure(vec![3], SharingResultCode::ArchiveError, "boom"));

        let result = pending.wait().unwrap();
        assert_eq!(result.code, SharingResultCode::ArchiveError);
        assert_eq!(result.categories, vec![3]);
    }

    #[test]
    fn test_dropped_reply_is_reported() {
        let (reply, pending) = archive_channel();
        drop(reply);
        assert_eq!(pending.wait().unwrap_err(), ReplyDropped);
    }

    #[test]
    fn test_async_receive() {
        let (reply, pending) = archive_channel();
        thread::spawn(move || reply.send(SharingResult::success(vec![1], KMZ_MIME_TYPE, "/tmp/x.kmz")));

        let result = futures_executor::block_on(pending.recv()).unwrap();
        assert_eq!(result.code, SharingResultCode::Success);
        assert_eq!(result.sharing_path, PathBuf::from("/tmp/x.kmz"));
    }

    #[test]
    fn test_categories_are_kml_files() {
        let dir = tempfile::tempdir().unwrap();
        let bookmarks = dir.path().join("bookmarks");
        write_category(&bookmarks, "b.kml", "<kml/>");
        write_category(&bookmarks, "a.KML", "<kml/>");
        write_category(&bookmarks, "readme.txt", "not a category");

        let producer = KmzArchiveProducer::new(&bookmarks, dir.path().join("cache"));
        assert_eq!(producer.categories(), vec![0, 1]);

        let missing = KmzArchiveProducer::new(dir.path().join("none"), dir.path().join("cache"));
        assert!(missing.categories().is_empty());
    }

    #[test]
    fn test_empty_collection_reports_empty_category() {
        let dir = tempfile::tempdir().unwrap();
        let bookmarks = dir.path().join("bookmarks");
        write_category(&bookmarks, "empty.kml", "");

        let producer = KmzArchiveProducer::new(&bookmarks, dir.path().join("cache"));

        assert_eq!(prepare(&producer, &[]).code, SharingResultCode::EmptyCategory);
        assert_eq!(prepare(&producer, &[0]).code, SharingResultCode::EmptyCategory);
    }

    #[test]
    fn test_archive_contains_selected_categories() {
        let dir = tempfile::tempdir().unwrap();
        let bookmarks = dir.path().join("bookmarks");
        write_category(&bookmarks, "hiking.kml", "<kml>hiking</kml>");
        write_category(&bookmarks, "food.kml", "<kml>food</kml>");

        let producer = KmzArchiveProducer::new(&bookmarks, dir.path().join("cache"));
        let result = prepare(&producer, &producer.categories());

        assert_eq!(result.code, SharingResultCode::Success);
        assert_eq!(result.mime_type, KMZ_MIME_TYPE);
        assert!(result.sharing_path.starts_with(dir.path().join("cache")));

        let mut archive = zip::ZipArchive::new(File::open(&result.sharing_path).unwrap()).unwrap();
        assert_eq!(archive.len(), 2);
        let mut content = String::new();
        archive
            .by_name("hiking.kml")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "<kml>hiking</kml>");
    }

    #[test]
    fn test_unsupported_format_is_an_archive_error() {
        let dir = tempfile::tempdir().unwrap();
        let bookmarks = dir.path().join("bookmarks");
        write_category(&bookmarks, "hiking.kml", "<kml/>");

        let producer = KmzArchiveProducer::new(&bookmarks, dir.path().join("cache"));
        let (reply, pending) = archive_channel();
        producer.prepare(&[0], KmlFileType::Gpx, reply);

        assert_eq!(pending.wait().unwrap().code, SharingResultCode::ArchiveError);
    }
}
