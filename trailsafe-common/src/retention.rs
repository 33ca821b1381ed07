// Count-based retention policy for backup folders

/// Default number of backups kept in the backup location
pub const MAX_BACKUPS_DEFAULT_COUNT: u32 = 10;

/// Retention policy bounding the number of backups kept
///
/// Backups are ranked by name. Names come from [`crate::naming`], so the
/// ranking is chronological and the oldest backups are evicted first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Number of backups to keep
    pub max_backups: u32,
}

impl RetentionPolicy {
    pub fn new(max_backups: u32) -> Self {
        Self { max_backups }
    }

    /// Pick the backups to delete so that at most `max_backups` remain
    ///
    /// `name_of` extracts the sort key. Entries sharing a name keep their
    /// listing order, so the choice is deterministic for a given listing.
    /// The input is not filtered; callers pass backup folders only.
    pub fn select_for_eviction<T, F>(&self, mut folders: Vec<T>, name_of: F) -> Vec<T>
    where
        F: FnMut(&T) -> String,
    {
        let limit = self.max_backups as usize;
        if folders.len() <= limit {
            return Vec::new();
        }

        // Stable sort, oldest first
        folders.sort_by_cached_key(name_of);

        let excess = folders.len() - limit;
        folders.truncate(excess);
        folders
    }
}
