//! Most-recently-opened workspace roots, persisted as JSON.
//!
//! Persistence is best-effort: a missing or corrupt file starts an empty
//! list, and save failures are logged but never surface to the caller.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, warn};

#[derive(Debug, Default, Serialize, Deserialize)]
struct RecentFile {
    #[serde(default)]
    directories: Vec<String>,
}

#[derive(Debug)]
pub struct RecentDirectories {
    /// `None` keeps the list in memory only.
    path: Option<PathBuf>,
    limit: usize,
    directories: Vec<String>,
}

impl RecentDirectories {
    /// Load the list from `path`, or start empty.
    pub fn load(path: Option<PathBuf>, limit: usize) -> Self {
        let directories = path
            .as_ref()
            .and_then(|p| match std::fs::read_to_string(p) {
                Ok(content) => match serde_json::from_str::<RecentFile>(&content) {
                    Ok(file) => Some(file.directories),
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "ignoring malformed recent directories file");
                        None
                    }
                },
                Err(_) => None,
            })
            .unwrap_or_default();

        let mut recent = Self {
            path,
            limit,
            directories,
        };
        recent.directories.truncate(limit);
        recent
    }

    /// Newest first.
    pub fn list(&self) -> Vec<String> {
        self.directories.clone()
    }

    /// Move `dir` to the front, trim to the limit, and persist.
    pub fn record(&mut self, dir: &str) {
        self.directories.retain(|d| d != dir);
        self.directories.insert(0, dir.to_string());
        self.directories.truncate(self.limit);
        self.save();
    }

    fn save(&self) {
        let Some(path) = &self.path else {
            return;
        };
        let file = RecentFile {
            directories: self.directories.clone(),
        };
        let result = serde_json::to_string_pretty(&file)
            .map_err(std::io::Error::other)
            .and_then(|json| {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(path, json)
            });
        match result {
            Ok(()) => debug!(path = %path.display(), "saved recent directories"),
            Err(e) => warn!(path = %path.display(), error = %e, "failed to save recent directories"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn most_recent_first_without_duplicates() {
        let mut recent = RecentDirectories::load(None, 3);
        recent.record("/a");
        recent.record("/b");
        recent.record("/a");
        assert_eq!(recent.list(), vec!["/a", "/b"]);

        recent.record("/c");
        recent.record("/d");
        assert_eq!(recent.list(), vec!["/d", "/c", "/a"]);
    }

    #[test]
    fn persists_across_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("recent.json");

        let mut recent = RecentDirectories::load(Some(path.clone()), 10);
        recent.record("/papers/thesis");
        recent.record("/papers/slides");

        let reloaded = RecentDirectories::load(Some(path), 10);
        assert_eq!(reloaded.list(), vec!["/papers/slides", "/papers/thesis"]);
    }

    #[test]
    fn corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recent.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(RecentDirectories::load(Some(path), 10).list().is_empty());
    }
}
