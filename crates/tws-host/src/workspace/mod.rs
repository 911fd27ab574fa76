//! The sandboxed workspace: current root, file catalog, recent roots.

pub mod catalog;
pub mod recent;
pub mod sandbox;

pub use catalog::{ExtensionPolicy, WorkspaceCatalog};
pub use recent::RecentDirectories;

use crate::config::expand_tilde_str;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tws_core::{TwsError, TwsResult};

/// Process-wide workspace state. Owned by the host's coordinating task.
pub struct Workspace {
    /// Canonical, verified directory; `None` until one is chosen.
    root: Option<PathBuf>,
    catalog: Arc<WorkspaceCatalog>,
    recent: RecentDirectories,
}

impl Workspace {
    pub fn new(catalog: WorkspaceCatalog, recent: RecentDirectories) -> Self {
        Self {
            root: None,
            catalog: Arc::new(catalog),
            recent,
        }
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// The root, or `NoWorkspace`.
    pub fn require_root(&self) -> TwsResult<PathBuf> {
        self.root.clone().ok_or(TwsError::NoWorkspace)
    }

    /// Display name of the current root (its last component).
    pub fn name(&self) -> Option<String> {
        self.root.as_deref().map(dir_name)
    }

    pub fn catalog(&self) -> Arc<WorkspaceCatalog> {
        self.catalog.clone()
    }

    pub fn recent(&self) -> Vec<String> {
        self.recent.list()
    }

    /// Switch the root to `path` (`~` allowed, relative paths are taken from
    /// the host's cwd). The root only changes if `path` is an existing
    /// directory.
    pub fn set_root(&mut self, path: &str) -> TwsResult<PathBuf> {
        let trimmed = path.trim();
        if trimmed.is_empty() {
            return Err(TwsError::Other("no path provided".into()));
        }

        let expanded = expand_tilde_str(trimmed);
        let absolute = if expanded.is_absolute() {
            expanded
        } else {
            std::env::current_dir()?.join(expanded)
        };
        let root = absolute.canonicalize().map_err(|_| {
            TwsError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("directory not found: {trimmed}"),
            ))
        })?;
        if !root.is_dir() {
            return Err(TwsError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("not a directory: {trimmed}"),
            )));
        }

        info!(path = %root.display(), "opened directory");
        self.recent.record(&root.to_string_lossy());
        self.root = Some(root.clone());
        Ok(root)
    }

    /// Working directory for new terminals: the root, else the user's home.
    pub fn terminal_cwd(&self) -> PathBuf {
        self.root
            .clone()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("/"))
    }
}

pub fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workspace() -> Workspace {
        Workspace::new(
            WorkspaceCatalog::default(),
            RecentDirectories::load(None, 10),
        )
    }

    #[test]
    fn unset_root_requires_workspace() {
        let ws = workspace();
        assert!(ws.root().is_none());
        assert!(matches!(ws.require_root(), Err(TwsError::NoWorkspace)));
        assert!(ws.name().is_none());
    }

    #[test]
    fn set_root_canonicalizes_and_records() {
        let dir = tempfile::tempdir().unwrap();
        let mut ws = workspace();

        let root = ws.set_root(&dir.path().to_string_lossy()).unwrap();
        assert_eq!(root, dir.path().canonicalize().unwrap());
        assert_eq!(ws.require_root().unwrap(), root);
        assert_eq!(ws.recent(), vec![root.to_string_lossy().into_owned()]);
        assert_eq!(ws.terminal_cwd(), root);
    }

    #[test]
    fn invalid_root_keeps_previous() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain.txt");
        std::fs::write(&file, "x").unwrap();
        let mut ws = workspace();
        let root = ws.set_root(&dir.path().to_string_lossy()).unwrap();

        assert!(ws.set_root("/definitely/not/a/dir").is_err());
        assert!(ws.set_root(&file.to_string_lossy()).is_err());
        assert!(ws.set_root("  ").is_err());
        assert_eq!(ws.root(), Some(root.as_path()));
    }

    #[test]
    fn dir_name_is_last_component() {
        assert_eq!(dir_name(Path::new("/home/u/thesis")), "thesis");
        assert_eq!(dir_name(Path::new("/")), "/");
    }
}
