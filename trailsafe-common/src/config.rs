// Centralized configuration for Trailsafe

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Trailsafe configuration with support for a TOML file and environment overrides
///
/// Runtime backup settings (location, interval, count) live in the preference
/// store, not here. This only says where things are and how the service runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrailsafeConfig {
    /// Preference store (default: ~/.config/trailsafe/preferences.json)
    pub preferences_file: PathBuf,

    /// Directory holding one `.kml` file per bookmark category
    /// (default: ~/.local/share/trailsafe/bookmarks)
    pub bookmarks_dir: PathBuf,

    /// Scratch directory for prepared archives (default: ~/.cache/trailsafe)
    pub cache_dir: PathBuf,

    /// Number of worker threads for archive waiting and file I/O
    pub worker_threads: usize,

    /// How often the scheduler service asks whether a backup is due
    pub check_interval_seconds: u64,
}

impl Default for TrailsafeConfig {
    fn default() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("trailsafe");
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("trailsafe");
        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("trailsafe");

        Self {
            preferences_file: config_dir.join("preferences.json"),
            bookmarks_dir: data_dir.join("bookmarks"),
            cache_dir,
            worker_threads: 2,
            check_interval_seconds: 300,
        }
    }
}

impl TrailsafeConfig {
    /// Default location of the optional config file (~/.config/trailsafe/config.toml)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("trailsafe").join("config.toml"))
    }

    /// Load the configuration, then apply environment variable overrides
    ///
    /// The file is `TRAILSAFE_CONFIG` if set, otherwise [`default_path`](Self::default_path).
    /// A missing file means defaults.
    ///
    /// Supported environment variables:
    /// - TRAILSAFE_PREFERENCES_FILE: Override preference store path
    /// - TRAILSAFE_BOOKMARKS_DIR: Override bookmarks directory
    /// - TRAILSAFE_CACHE_DIR: Override cache directory
    /// - TRAILSAFE_WORKER_THREADS: Override worker pool size
    /// - TRAILSAFE_CHECK_INTERVAL_SECS: Override scheduler check interval
    pub fn new() -> anyhow::Result<Self> {
        let path = std::env::var_os("TRAILSAFE_CONFIG")
            .map(PathBuf::from)
            .or_else(Self::default_path);

        match path {
            Some(path) => Self::from_file(&path),
            None => {
                let mut config = Self::default();
                config.apply_env_overrides();
                Ok(config)
            }
        }
    }

    /// Load `path` and apply environment variable overrides
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(file) = std::env::var("TRAILSAFE_PREFERENCES_FILE") {
            self.preferences_file = PathBuf::from(file);
        }

        if let Ok(dir) = std::env::var("TRAILSAFE_BOOKMARKS_DIR") {
            self.bookmarks_dir = PathBuf::from(dir);
        }

        if let Ok(dir) = std::env::var("TRAILSAFE_CACHE_DIR") {
            self.cache_dir = PathBuf::from(dir);
        }

        if let Ok(threads) = std::env::var("TRAILSAFE_WORKER_THREADS") {
            match threads.parse::<usize>() {
                Ok(n) if n > 0 => self.worker_threads = n,
                _ => log::warn!("Ignoring invalid TRAILSAFE_WORKER_THREADS={:?}", threads),
            }
        }

        if let Ok(secs) = std::env::var("TRAILSAFE_CHECK_INTERVAL_SECS") {
            match secs.parse::<u64>() {
                Ok(n) if n > 0 => self.check_interval_seconds = n,
                _ => log::warn!("Ignoring invalid TRAILSAFE_CHECK_INTERVAL_SECS={:?}", secs),
            }
        }
    }
}
