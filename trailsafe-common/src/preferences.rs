//! Persisted key/value preferences
//!
//! Backup settings and schedule state are kept as a flat string-keyed map.
//! Values are either strings (user-editable settings such as the interval or
//! the maximum backup count) or integers (timestamps written by the program).

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Mutex;

/// String-keyed preference storage
///
/// Reads never fail: a missing or unreadable store behaves as empty. Writes
/// report I/O failures to the caller.
pub trait Preferences: Send + Sync {
    /// Raw value stored under `key`
    fn get(&self, key: &str) -> Option<Value>;

    /// Store `value` under `key`, replacing any previous value
    fn put(&self, key: &str, value: Value) -> Result<()>;

    /// Remove `key` if present
    fn remove(&self, key: &str) -> Result<()>;

    /// String value under `key`; numbers are rendered as strings
    fn get_string(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Integer value under `key`, or `default` if missing or not an integer
    fn get_i64(&self, key: &str, default: i64) -> i64 {
        match self.get(key) {
            Some(Value::Number(n)) => n.as_i64().unwrap_or(default),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(default),
            _ => default,
        }
    }

    fn put_string(&self, key: &str, value: &str) -> Result<()> {
        self.put(key, Value::String(value.to_string()))
    }

    fn put_i64(&self, key: &str, value: i64) -> Result<()> {
        self.put(key, Value::from(value))
    }
}

/// Preferences stored as a JSON object in a single file
///
/// Every write reloads the file under an exclusive lock and replaces it
/// atomically, so the CLI and the scheduler service can share one file.
/// The lock is taken on a sibling `.lock` file, which outlives the renames
/// that replace the data file.
pub struct JsonPreferences {
    path: PathBuf,
    lock_path: PathBuf,
}

impl JsonPreferences {
    /// Open (or lazily create) the preference file at `path`
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create preferences directory {}", parent.display())
            })?;
        }

        let mut lock_path = path.clone().into_os_string();
        lock_path.push(".lock");
        Ok(Self {
            path,
            lock_path: PathBuf::from(lock_path),
        })
    }

    fn load(&self) -> Result<Map<String, Value>> {
        let _lock = self.lock(false)?;
        let content = self.read_content()?;
        if content.trim().is_empty() {
            return Ok(Map::new());
        }

        serde_json::from_str(&content).context("Failed to parse preferences")
    }

    fn update<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut Map<String, Value>),
    {
        let _lock = self.lock(true)?;

        let mut prefs = self.load_for_update()?;
        change(&mut prefs);

        let content =
            serde_json::to_string_pretty(&prefs).context("Failed to serialize preferences")?;
        let tmp_path = self.path.with_extension("tmp");

        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp_path)
                .with_context(|| {
                    format!("Failed to open temporary preferences file {}", tmp_path.display())
                })?;
            file.write_all(content.as_bytes())
                .context("Failed to write preferences")?;
            file.sync_all().context("Failed to sync preferences")?;
        }

        fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        Ok(())
    }

    // Caller holds the exclusive lock
    fn load_for_update(&self) -> Result<Map<String, Value>> {
        let content = self.read_content()?;
        if content.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str(&content) {
            Ok(prefs) => Ok(prefs),
            Err(e) => {
                log::error!(
                    "Preferences at {} are corrupt, starting over: {}",
                    self.path.display(),
                    e
                );
                Ok(Map::new())
            }
        }
    }

    /// File content, empty if the file does not exist yet
    fn read_content(&self) -> Result<String> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", self.path.display())),
        }
    }

    /// Lock shared by all processes using this preference file
    ///
    /// Released when the returned file is dropped.
    fn lock(&self, exclusive: bool) -> Result<File> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_path)
            .with_context(|| format!("Failed to open {}", self.lock_path.display()))?;

        if exclusive {
            fs2::FileExt::lock_exclusive(&file)
                .context("Failed to lock preferences for writing")?;
        } else {
            fs2::FileExt::lock_shared(&file).context("Failed to lock preferences for reading")?;
        }

        Ok(file)
    }
}

impl Preferences for JsonPreferences {
    fn get(&self, key: &str) -> Option<Value> {
        match self.load() {
            Ok(mut prefs) => prefs.remove(key),
            Err(e) => {
                log::warn!("Failed to load preferences from {}: {:#}", self.path.display(), e);
                None
            }
        }
    }

    fn put(&self, key: &str, value: Value) -> Result<()> {
        self.update(|prefs| {
            prefs.insert(key.to_string(), value);
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.update(|prefs| {
            prefs.remove(key);
        })
    }
}

/// Preferences kept in memory only
#[derive(Debug, Default)]
pub struct MemoryPreferences {
    values: Mutex<Map<String, Value>>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }

    fn values(&self) -> std::sync::MutexGuard<'_, Map<String, Value>> {
        self.values.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Preferences for MemoryPreferences {
    fn get(&self, key: &str) -> Option<Value> {
        self.values().get(key).cloned()
    }

    fn put(&self, key: &str, value: Value) -> Result<()> {
        self.values().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.values().remove(key);
        Ok(())
    }
}
