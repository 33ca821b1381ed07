//! Test doubles for the backup location and the archive producer

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::thread;

use crate::archive::{
    ArchiveProducer, ArchiveReply, CategoryId, KmlFileType, SharingResult, SharingResultCode,
};
use crate::folder::DocumentHandle;

#[derive(Debug)]
enum NodeKind {
    Dir(Vec<Arc<Mutex<Node>>>),
    File {
        mime_type: String,
        bytes: Arc<Mutex<Vec<u8>>>,
    },
}

#[derive(Debug)]
struct Node {
    name: String,
    kind: NodeKind,
    writable: bool,
    fail_delete: bool,
    parent: Weak<Mutex<Node>>,
}

fn lock(node: &Mutex<Node>) -> MutexGuard<'_, Node> {
    node.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// An in-memory document tree
#[derive(Debug, Clone)]
pub struct MemoryDocument {
    node: Arc<Mutex<Node>>,
}

impl MemoryDocument {
    /// A writable, empty root folder
    pub fn root() -> Self {
        Self {
            node: Arc::new(Mutex::new(Node {
                name: "root".to_string(),
                kind: NodeKind::Dir(Vec::new()),
                writable: true,
                fail_delete: false,
                parent: Weak::new(),
            })),
        }
    }

    pub fn set_writable(&self, writable: bool) {
        lock(&self.node).writable = writable;
    }

    /// Make deleting this document fail
    pub fn fail_deletes(&self) {
        lock(&self.node).fail_delete = true;
    }

    /// Add a folder regardless of the writable flag
    pub fn add_dir(&self, name: &str) -> MemoryDocument {
        self.insert(name, NodeKind::Dir(Vec::new()))
    }

    /// Add a file with content regardless of the writable flag
    pub fn add_file(&self, name: &str, content: &[u8]) -> MemoryDocument {
        self.insert(
            name,
            NodeKind::File {
                mime_type: "application/octet-stream".to_string(),
                bytes: Arc::new(Mutex::new(content.to_vec())),
            },
        )
    }

    /// Child with the given name
    pub fn find(&self, name: &str) -> Option<MemoryDocument> {
        match &lock(&self.node).kind {
            NodeKind::Dir(children) => children
                .iter()
                .find(|child| lock(child).name == name)
                .map(|child| MemoryDocument { node: child.clone() }),
            NodeKind::File { .. } => None,
        }
    }

    /// Sorted names of the direct children
    pub fn child_names(&self) -> Vec<String> {
        let mut names: Vec<String> = match &lock(&self.node).kind {
            NodeKind::Dir(children) => children.iter().map(|child| lock(child).name.clone()).collect(),
            NodeKind::File { .. } => Vec::new(),
        };
        names.sort();
        names
    }

    /// Content and MIME type of a file
    pub fn contents(&self) -> Option<(String, Vec<u8>)> {
        match &lock(&self.node).kind {
            NodeKind::File { mime_type, bytes } => {
                let bytes = bytes.lock().unwrap_or_else(|p| p.into_inner()).clone();
                Some((mime_type.clone(), bytes))
            }
            NodeKind::Dir(_) => None,
        }
    }

    fn insert(&self, name: &str, kind: NodeKind) -> MemoryDocument {
        let child = Arc::new(Mutex::new(Node {
            name: name.to_string(),
            kind,
            writable: true,
            fail_delete: false,
            parent: Arc::downgrade(&self.node),
        }));
        if let NodeKind::Dir(children) = &mut lock(&self.node).kind {
            children.push(child.clone());
        }
        MemoryDocument { node: child }
    }

    fn checked_insert(&self, name: &str, kind: NodeKind) -> io::Result<MemoryDocument> {
        {
            let node = lock(&self.node);
            if !node.writable {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only folder"));
            }
            let NodeKind::Dir(children) = &node.kind else {
                return Err(io::Error::new(io::ErrorKind::InvalidInput, "not a folder"));
            };
            if children.iter().any(|child| lock(child).name == name) {
                return Err(io::Error::new(io::ErrorKind::AlreadyExists, name.to_string()));
            }
        }
        Ok(self.insert(name, kind))
    }
}

impl DocumentHandle for MemoryDocument {
    fn name(&self) -> Option<String> {
        Some(lock(&self.node).name.clone())
    }

    fn uri(&self) -> String {
        let mut parts = vec![lock(&self.node).name.clone()];
        let mut parent = lock(&self.node).parent.upgrade();
        while let Some(node) = parent {
            let guard = lock(&node);
            parts.push(guard.name.clone());
            parent = guard.parent.upgrade();
        }
        parts.reverse();
        format!("memory://{}", parts.join("/"))
    }

    fn is_directory(&self) -> bool {
        matches!(lock(&self.node).kind, NodeKind::Dir(_))
    }

    fn can_write(&self) -> bool {
        lock(&self.node).writable
    }

    fn list_children(&self) -> io::Result<Vec<Box<dyn DocumentHandle>>> {
        match &lock(&self.node).kind {
            NodeKind::Dir(children) => Ok(children
                .iter()
                .map(|child| Box::new(MemoryDocument { node: child.clone() }) as Box<dyn DocumentHandle>)
                .collect()),
            NodeKind::File { .. } => Err(io::Error::new(io::ErrorKind::InvalidInput, "not a folder")),
        }
    }

    fn create_directory(&self, name: &str) -> io::Result<Box<dyn DocumentHandle>> {
        let dir = self.checked_insert(name, NodeKind::Dir(Vec::new()))?;
        Ok(Box::new(dir))
    }

    fn create_file(&self, mime_type: &str, name: &str) -> io::Result<Box<dyn DocumentHandle>> {
        let file = self.checked_insert(
            name,
            NodeKind::File {
                mime_type: mime_type.to_string(),
                bytes: Arc::new(Mutex::new(Vec::new())),
            },
        )?;
        Ok(Box::new(file))
    }

    fn open_writer(&self) -> io::Result<Box<dyn Write + Send>> {
        match &lock(&self.node).kind {
            NodeKind::File { bytes, .. } => {
                bytes.lock().unwrap_or_else(|p| p.into_inner()).clear();
                Ok(Box::new(MemoryWriter(bytes.clone())))
            }
            NodeKind::Dir(_) => Err(io::Error::new(io::ErrorKind::InvalidInput, "not a file")),
        }
    }

    fn delete_recursive(&self) -> io::Result<()> {
        let parent = {
            let node = lock(&self.node);
            if node.fail_delete {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "delete refused"));
            }
            node.parent.upgrade()
        };
        let parent = parent
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "cannot delete the root"))?;

        if let NodeKind::Dir(children) = &mut lock(&parent).kind {
            children.retain(|child| !Arc::ptr_eq(child, &self.node));
        }
        Ok(())
    }
}

struct MemoryWriter(Arc<Mutex<Vec<u8>>>);

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap_or_else(|p| p.into_inner()).extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Producer answering every request with a fixed result from its own thread
pub struct ScriptedProducer {
    pub code: SharingResultCode,
    pub sharing_path: PathBuf,
    pub requests: Mutex<Vec<(Vec<CategoryId>, KmlFileType)>>,
}

impl ScriptedProducer {
    pub fn new(code: SharingResultCode, sharing_path: impl Into<PathBuf>) -> Self {
        Self {
            code,
            sharing_path: sharing_path.into(),
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl ArchiveProducer for ScriptedProducer {
    fn categories(&self) -> Vec<CategoryId> {
        vec![1, 2]
    }

    fn prepare(&self, categories: &[CategoryId], format: KmlFileType, reply: ArchiveReply) {
        self.requests
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push((categories.to_vec(), format));

        let result = SharingResult {
            categories: categories.to_vec(),
            code: self.code,
            mime_type: "application/vnd.google-earth.kmz".to_string(),
            sharing_path: self.sharing_path.clone(),
            error_message: None,
        };
        thread::spawn(move || reply.send(result));
    }
}

/// Producer that keeps the reply until the test releases it
#[derive(Default)]
pub struct HeldProducer {
    reply: Mutex<Option<ArchiveReply>>,
}

impl HeldProducer {
    /// Answer the pending request with `code`, or drop it when `code` is `None`
    pub fn release(&self, code: Option<SharingResultCode>) {
        let reply = self.reply.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let (Some(reply), Some(code)) = (reply, code) {
            reply.send(SharingResult::failure(vec![], code, "released by test"));
        }
    }
}

impl ArchiveProducer for HeldProducer {
    fn categories(&self) -> Vec<CategoryId> {
        vec![7]
    }

    fn prepare(&self, _categories: &[CategoryId], _format: KmlFileType, reply: ArchiveReply) {
        *self.reply.lock().unwrap_or_else(|p| p.into_inner()) = Some(reply);
    }
}
