//! Capability-scoped access to the backup location
//!
//! The backup code never builds paths itself. It only walks down from the
//! handle of the folder the user granted, the way a document tree works on
//! platforms with scoped storage.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;

use nix::unistd::{AccessFlags, access};

/// A folder or file inside the user-granted backup location
pub trait DocumentHandle: Send + Sync + fmt::Debug {
    /// Display name, `None` if it cannot be determined
    fn name(&self) -> Option<String>;

    /// Stable identity of this document, suitable for logs
    fn uri(&self) -> String;

    fn is_directory(&self) -> bool;

    /// Whether new documents can be created inside (or content written to) this one
    fn can_write(&self) -> bool;

    /// Direct children of a folder
    fn list_children(&self) -> io::Result<Vec<Box<dyn DocumentHandle>>>;

    /// Create a sub-folder; fails if `name` already exists
    fn create_directory(&self, name: &str) -> io::Result<Box<dyn DocumentHandle>>;

    /// Create an empty file; fails if `name` already exists
    fn create_file(&self, mime_type: &str, name: &str) -> io::Result<Box<dyn DocumentHandle>>;

    /// Open a file for writing, truncating existing content
    fn open_writer(&self) -> io::Result<Box<dyn Write + Send>>;

    /// Delete this document, including everything below it
    fn delete_recursive(&self) -> io::Result<()>;
}

/// A document on the local filesystem
#[derive(Debug, Clone)]
pub struct LocalDocument {
    path: PathBuf,
}

impl LocalDocument {
    /// Open the folder identified by a stored backup location
    pub fn open(location: impl Into<PathBuf>) -> io::Result<Self> {
        let path = location.into();
        let metadata = fs::metadata(&path)?;
        if !metadata.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a directory", path.display()),
            ));
        }
        Ok(Self { path })
    }

    fn child(&self, name: &str) -> io::Result<PathBuf> {
        if name.is_empty() || name.contains('/') || name.contains('\0') || name == "." || name == ".."
        {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid document name {name:?}"),
            ));
        }
        Ok(self.path.join(name))
    }
}

impl DocumentHandle for LocalDocument {
    fn name(&self) -> Option<String> {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.to_string())
    }

    fn uri(&self) -> String {
        format!("file://{}", self.path.display())
    }

    fn is_directory(&self) -> bool {
        self.path.is_dir()
    }

    fn can_write(&self) -> bool {
        // Entering a directory to create children also needs search permission
        let mode = if self.path.is_dir() {
            AccessFlags::W_OK | AccessFlags::X_OK
        } else {
            AccessFlags::W_OK
        };
        access(self.path.as_path(), mode).is_ok()
    }

    fn list_children(&self) -> io::Result<Vec<Box<dyn DocumentHandle>>> {
        let mut children: Vec<Box<dyn DocumentHandle>> = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            children.push(Box::new(LocalDocument { path: entry.path() }));
        }
        Ok(children)
    }

    fn create_directory(&self, name: &str) -> io::Result<Box<dyn DocumentHandle>> {
        let path = self.child(name)?;
        fs::create_dir(&path)?;
        Ok(Box::new(LocalDocument { path }))
    }

    // The local filesystem has no use for the MIME type
    fn create_file(&self, _mime_type: &str, name: &str) -> io::Result<Box<dyn DocumentHandle>> {
        let path = self.child(name)?;
        File::create_new(&path)?;
        Ok(Box::new(LocalDocument { path }))
    }

    fn open_writer(&self) -> io::Result<Box<dyn Write + Send>> {
        let file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        Ok(Box::new(file))
    }

    fn delete_recursive(&self) -> io::Result<()> {
        if self.path.is_dir() {
            fs::remove_dir_all(&self.path)
        } else {
            fs::remove_file(&self.path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_requires_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain.txt");
        fs::write(&file, "x").unwrap();

        assert!(LocalDocument::open(dir.path()).is_ok());
        assert!(LocalDocument::open(&file).is_err());
        assert!(LocalDocument::open(dir.path().join("missing")).is_err());
    }

    #[test]
    fn test_create_write_list_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let root = LocalDocument::open(dir.path()).unwrap();
        assert!(root.can_write());

        let folder = root.create_directory("backup_2024-01-01_00-00-00").unwrap();
        assert!(folder.is_directory());
        assert_eq!(folder.name().as_deref(), Some("backup_2024-01-01_00-00-00"));

        let file = folder
            .create_file("application/vnd.google-earth.kmz", "backup.kmz")
            .unwrap();
        assert!(!file.is_directory());
        file.open_writer().unwrap().write_all(b"archive").unwrap();
        assert_eq!(
            fs::read(dir.path().join("backup_2024-01-01_00-00-00/backup.kmz")).unwrap(),
            b"archive"
        );

        let children = root.list_children().unwrap();
        assert_eq!(children.len(), 1);

        folder.delete_recursive().unwrap();
        assert!(root.list_children().unwrap().is_empty());
    }

    #[test]
    fn test_existing_names_are_not_reused() {
        let dir = tempfile::tempdir().unwrap();
        let root = LocalDocument::open(dir.path()).unwrap();

        root.create_directory("backup_a").unwrap();
        let err = root.create_directory("backup_a").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);

        root.create_file("text/plain", "notes.txt").unwrap();
        assert!(root.create_file("text/plain", "notes.txt").is_err());
    }

    #[test]
    fn test_names_cannot_escape_the_folder() {
        let dir = tempfile::tempdir().unwrap();
        let root = LocalDocument::open(dir.path()).unwrap();

        assert!(root.create_directory("../outside").is_err());
        assert!(root.create_directory("..").is_err());
        assert!(root.create_file("text/plain", "").is_err());
    }

    #[test]
    fn test_can_write_agrees_with_create_directory() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let locked = dir.path().join("locked");
        fs::create_dir(&locked).unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o555)).unwrap();

        // root bypasses the mode bits, everyone else is refused
        let root = LocalDocument::open(&locked).unwrap();
        let writable = root.can_write();
        let created = root.create_directory("backup").is_ok();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(writable, created);
    }

    #[test]
    fn test_writable_folder_can_write() {
        let dir = tempfile::tempdir().unwrap();
        let root = LocalDocument::open(dir.path()).unwrap();

        assert!(root.can_write());
        assert!(root.create_directory("backup").unwrap().can_write());
    }
}
