//! Path containment for client-supplied relative paths.
//!
//! A request path is joined onto the workspace root, normalized lexically,
//! and then canonicalized through the longest ancestor that exists on disk.
//! Both the lexical and the canonical form must stay under the canonical
//! root, so neither `..` segments nor symlinks can reach outside it.

use std::io;
use std::path::{Component, Path, PathBuf};
use tws_core::{TwsError, TwsResult};

/// Resolve `relative` against `root`, rejecting anything that leaves it.
///
/// An empty path resolves to the root itself. The target does not have to
/// exist (so `saveFile` can create new files), but every ancestor that does
/// exist is resolved through symlinks before the containment check.
pub fn resolve(root: &Path, relative: &str) -> TwsResult<PathBuf> {
    let root = root.canonicalize()?;
    let lexical = normalize(&root.join(relative));
    if !lexical.starts_with(&root) {
        return Err(TwsError::PathEscape(relative.to_string()));
    }

    let resolved = canonicalize_existing_prefix(&lexical)?;
    if !resolved.starts_with(&root) {
        return Err(TwsError::PathEscape(relative.to_string()));
    }
    Ok(resolved)
}

/// Render `path` relative to `root` with `/` separators, for the wire.
pub fn relative_display(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Collapse `.` and `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(part) => out.push(part),
        }
    }
    out
}

/// Canonicalize the deepest ancestor of `path` that exists and re-attach the
/// missing tail. Dangling symlinks count as existing and fail to resolve.
fn canonicalize_existing_prefix(path: &Path) -> TwsResult<PathBuf> {
    let mut existing = path;
    let mut tail = Vec::new();
    while std::fs::symlink_metadata(existing).is_err() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                tail.push(name.to_os_string());
                existing = parent;
            }
            _ => {
                return Err(TwsError::Io(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no existing ancestor for {}", path.display()),
                )))
            }
        }
    }

    let mut resolved = existing.canonicalize()?;
    for name in tail.into_iter().rev() {
        resolved.push(name);
    }
    Ok(resolved)
}
