use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use super::BlacklistMembership;

/// Reverse-DNS hostname blacklist loaded from a line-oriented file:
/// `#` comments and blank lines ignored, entries lowercased. Reloadable so
/// the blacklist updater's atomic file replace is picked up without
/// restarting the process.
pub struct FileBlacklist {
    path: PathBuf,
    entries: RwLock<HashSet<String>>,
}

impl FileBlacklist {
    pub fn load(path: &Path) -> Self {
        let entries = read_entries(path);
        FileBlacklist {
            path: path.to_path_buf(),
            entries: RwLock::new(entries),
        }
    }

    /// Re-read the backing file. Call after the updater has written a new
    /// version — there is no filesystem watch, the caller decides when.
    pub fn reload(&self) {
        let entries = read_entries(&self.path);
        *self.entries.write().unwrap() = entries;
    }
}

/// Reads a line-oriented blacklist file (`#` comments and blanks ignored,
/// entries lowercased). Shared with [`crate::blacklist_updater`] so both
/// the live resolver and the feed merge step agree on file format.
pub(crate) fn read_entries(path: &Path) -> HashSet<String> {
    fs::read_to_string(path)
        .map(|text| {
            text.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(str::to_lowercase)
                .collect()
        })
        .unwrap_or_default()
}

impl BlacklistMembership for FileBlacklist {
    fn is_blacklisted(&self, host: &str) -> bool {
        self.entries.read().unwrap().contains(&host.to_lowercase())
    }
}
