//! File listing, reading and writing under the workspace root.
//!
//! Every operation resolves its path through [`sandbox::resolve`] before
//! touching the filesystem. These calls block; the host runs them on the
//! blocking pool so terminal routing never waits on disk.

use super::sandbox;
use std::collections::HashSet;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, info};
use tws_core::{FileEntry, TwsError, TwsResult};

/// Extension allow-lists that decide which files are listed and how they
/// are classified.
#[derive(Debug, Clone)]
pub struct ExtensionPolicy {
    text: HashSet<String>,
    pdf: HashSet<String>,
    image: HashSet<String>,
}

impl ExtensionPolicy {
    pub fn new<S: AsRef<str>>(text: &[S], pdf: &[S], image: &[S]) -> Self {
        fn set<S: AsRef<str>>(items: &[S]) -> HashSet<String> {
            items
                .iter()
                .map(|s| s.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .collect()
        }
        Self {
            text: set(text),
            pdf: set(pdf),
            image: set(image),
        }
    }

    pub fn is_text(&self, name: &str) -> bool {
        extension(name).is_some_and(|ext| self.text.contains(&ext))
    }

    pub fn is_pdf(&self, name: &str) -> bool {
        extension(name).is_some_and(|ext| self.pdf.contains(&ext))
    }

    pub fn is_image(&self, name: &str) -> bool {
        extension(name).is_some_and(|ext| self.image.contains(&ext))
    }

    /// Whether a non-directory entry shows up in listings.
    pub fn is_allowed(&self, name: &str) -> bool {
        self.is_text(name) || self.is_pdf(name) || self.is_image(name)
    }
}

impl Default for ExtensionPolicy {
    fn default() -> Self {
        Self::new(
            &["tex", "bib", "sty", "cls", "txt", "md"],
            &["pdf"],
            &["jpg", "jpeg", "png", "gif", "svg"],
        )
    }
}

fn extension(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
}

/// Stateless view over a workspace root; the root is passed per call so a
/// root change never races an in-flight operation.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceCatalog {
    extensions: ExtensionPolicy,
}

impl WorkspaceCatalog {
    pub fn new(extensions: ExtensionPolicy) -> Self {
        Self { extensions }
    }

    /// List a directory: directories first, then files, each group sorted
    /// case-insensitively. Hidden entries and unlisted extensions are skipped.
    pub fn list(&self, root: &Path, relative: &str) -> TwsResult<Vec<FileEntry>> {
        let dir = sandbox::resolve(root, relative)?;
        let root = root.canonicalize()?;
        if !dir.is_dir() {
            return Err(TwsError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("not a directory: {relative}"),
            )));
        }

        let mut files = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }

            let path = entry.path();
            let is_directory = path.is_dir();
            if !is_directory && !self.extensions.is_allowed(&name) {
                continue;
            }

            files.push(FileEntry {
                path: sandbox::relative_display(&root, &path),
                is_text: !is_directory && self.extensions.is_text(&name),
                is_pdf: !is_directory && self.extensions.is_pdf(&name),
                is_image: !is_directory && self.extensions.is_image(&name),
                is_directory,
                name,
            });
        }

        files.sort_by_cached_key(|f| (!f.is_directory, f.name.to_lowercase()));
        debug!(path = %dir.display(), count = files.len(), "listed directory");
        Ok(files)
    }

    /// Read a file as UTF-8 text.
    pub fn read(&self, root: &Path, relative: &str) -> TwsResult<String> {
        let path = sandbox::resolve(root, relative)?;
        let bytes = std::fs::read(&path)?;
        String::from_utf8(bytes).map_err(|_| {
            TwsError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("not valid UTF-8 text: {relative}"),
            ))
        })
    }

    /// Overwrite (or create) a file.
    ///
    /// Content goes to a uniquely named hidden sibling first and is renamed
    /// over the target, so readers never observe a half-written file and
    /// concurrent saves never share a temp file. The last rename wins.
    pub fn write(&self, root: &Path, relative: &str, content: &str) -> TwsResult<()> {
        let path = sandbox::resolve(root, relative)?;
        if path.is_dir() {
            return Err(TwsError::Io(io::Error::new(
                io::ErrorKind::Other,
                format!("is a directory: {relative}"),
            )));
        }

        write_then_rename(&path, content)?;
        info!(path = %path.display(), bytes = content.len(), "saved file");
        Ok(())
    }

    /// Absolute path for raw access, if the path is contained and exists.
    pub fn resolve_absolute(&self, root: &Path, relative: &str) -> Option<PathBuf> {
        sandbox::resolve(root, relative)
            .ok()
            .filter(|path| path.exists())
    }

    /// Modification time in milliseconds since the epoch.
    pub fn mtime_millis(&self, root: &Path, relative: &str) -> Option<u64> {
        let path = sandbox::resolve(root, relative).ok()?;
        let modified = std::fs::metadata(path).ok()?.modified().ok()?;
        let millis = modified.duration_since(UNIX_EPOCH).ok()?.as_millis();
        u64::try_from(millis).ok()
    }
}

fn write_then_rename(target: &Path, content: &str) -> TwsResult<()> {
    let (Some(parent), Some(name)) = (target.parent(), target.file_name()) else {
        return Err(TwsError::PathEscape(target.display().to_string()));
    };
    // Removed on drop if anything below fails.
    let mut tmp = tempfile::Builder::new()
        .prefix(&format!(".{}.", name.to_string_lossy()))
        .suffix(".tmp")
        .tempfile_in(parent)?;
    tmp.write_all(content.as_bytes())?;
    if let Ok(meta) = std::fs::metadata(target) {
        tmp.as_file().set_permissions(meta.permissions())?;
    }
    tmp.persist(target).map_err(|e| TwsError::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn workspace() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        fs::write(root.join("b.txt"), "b").unwrap();
        fs::write(root.join("A.tex"), "a").unwrap();
        fs::write(root.join(".hidden"), "h").unwrap();
        fs::write(root.join("notes.docx"), "d").unwrap();
        fs::create_dir(root.join("sub")).unwrap();
        (dir, root)
    }

    #[test]
    fn listing_order_and_filtering() {
        let (_dir, root) = workspace();
        let catalog = WorkspaceCatalog::default();
        let names: Vec<String> = catalog
            .list(&root, "")
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names, vec!["sub", "A.tex", "b.txt"]);
    }

    #[test]
    fn entries_carry_classification_and_relative_paths() {
        let (_dir, root) = workspace();
        fs::write(root.join("sub").join("fig.PNG"), "p").unwrap();
        fs::write(root.join("sub").join("paper.pdf"), "p").unwrap();
        let catalog = WorkspaceCatalog::default();

        let files = catalog.list(&root, "sub").unwrap();
        assert_eq!(files.len(), 2);
        let fig = &files[0];
        assert_eq!(fig.path, "sub/fig.PNG");
        assert!(fig.is_image && !fig.is_text && !fig.is_pdf);
        let pdf = &files[1];
        assert!(pdf.is_pdf && !pdf.is_directory);
    }

    #[test]
    fn listing_outside_root_is_path_escape() {
        let (_dir, root) = workspace();
        let catalog = WorkspaceCatalog::default();
        assert!(matches!(
            catalog.list(&root, "../"),
            Err(TwsError::PathEscape(_))
        ));
    }

    #[test]
    fn listing_missing_dir_is_io_error() {
        let (_dir, root) = workspace();
        let catalog = WorkspaceCatalog::default();
        assert!(matches!(
            catalog.list(&root, "nope"),
            Err(TwsError::Io(_))
        ));
    }

    #[test]
    fn write_then_read_returns_same_content() {
        let (_dir, root) = workspace();
        let catalog = WorkspaceCatalog::default();
        let content = "\\section{Intro}\nüñí ✓\n";

        catalog.write(&root, "sub/intro.tex", content).unwrap();
        // Listing in between must not disturb the file.
        catalog.list(&root, "sub").unwrap();
        assert_eq!(catalog.read(&root, "sub/intro.tex").unwrap(), content);

        catalog.write(&root, "sub/intro.tex", "short").unwrap();
        assert_eq!(catalog.read(&root, "sub/intro.tex").unwrap(), "short");
    }

    #[test]
    fn write_leaves_no_temp_files() {
        let (_dir, root) = workspace();
        let catalog = WorkspaceCatalog::default();
        catalog.write(&root, "b.txt", "new").unwrap();
        let leftovers: Vec<_> = fs::read_dir(&root)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn concurrent_writes_to_one_file_all_succeed() {
        let (_dir, root) = workspace();
        let catalog = WorkspaceCatalog::default();
        let big_a = "A".repeat(512 * 1024);
        let big_b = "B".repeat(256 * 1024);

        for _ in 0..20 {
            std::thread::scope(|scope| {
                let a = scope.spawn(|| catalog.write(&root, "main.tex", &big_a));
                let b = scope.spawn(|| catalog.write(&root, "main.tex", &big_b));
                a.join().unwrap().unwrap();
                b.join().unwrap().unwrap();
            });
            let saved = catalog.read(&root, "main.tex").unwrap();
            assert!(saved == big_a || saved == big_b, "torn write: {} bytes", saved.len());
        }

        let leftovers: Vec<_> = fs::read_dir(&root)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn write_outside_root_is_rejected() {
        let (_dir, root) = workspace();
        let catalog = WorkspaceCatalog::default();
        assert!(matches!(
            catalog.write(&root, "../evil.txt", "x"),
            Err(TwsError::PathEscape(_))
        ));
    }

    #[test]
    fn read_rejects_non_utf8() {
        let (_dir, root) = workspace();
        fs::write(root.join("bin.txt"), [0xff, 0xfe, 0x00]).unwrap();
        let catalog = WorkspaceCatalog::default();
        assert!(matches!(
            catalog.read(&root, "bin.txt"),
            Err(TwsError::Io(_))
        ));
    }

    #[test]
    fn resolve_absolute_and_mtime() {
        let (_dir, root) = workspace();
        let catalog = WorkspaceCatalog::default();

        assert_eq!(
            catalog.resolve_absolute(&root, "A.tex"),
            Some(root.join("A.tex"))
        );
        assert_eq!(catalog.resolve_absolute(&root, "missing.pdf"), None);
        assert_eq!(catalog.resolve_absolute(&root, "../x"), None);

        assert!(catalog.mtime_millis(&root, "A.tex").unwrap() > 0);
        assert_eq!(catalog.mtime_millis(&root, "missing.tex"), None);
        assert_eq!(catalog.mtime_millis(&root, "../../etc/passwd"), None);
    }

    #[test]
    fn custom_extension_policy() {
        let policy = ExtensionPolicy::new(&[".RS"], &[], &[]);
        assert!(policy.is_text("main.rs"));
        assert!(!policy.is_allowed("paper.pdf"));
        assert!(!policy.is_allowed("Makefile"));
    }
}
