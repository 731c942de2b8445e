//! Filesystem discovery.
//!
//! [`PathSource`] walks a root directory without following symbolic links
//! and yields one [`SourceDocument`] per regular file. Unreadable subtrees
//! and files are logged and skipped; the rest of the walk continues.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::config::SourceConfig;
use crate::error::TraversalError;
use crate::models::{InferredTags, SourceDocument};

/// Restartable description of a directory tree to ingest.
#[derive(Debug, Clone)]
pub struct PathSource {
    root: PathBuf,
    excludes: GlobSet,
}

impl PathSource {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        Self::with_excludes(root, &[])
    }

    pub fn from_config(config: &SourceConfig) -> Result<Self> {
        Self::with_excludes(config.root.clone(), &config.exclude_globs)
    }

    pub fn with_excludes(root: impl Into<PathBuf>, exclude_globs: &[String]) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            bail!("Source root is not a directory: {}", root.display());
        }
        Ok(Self {
            root,
            excludes: build_globset(exclude_globs)?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Start a fresh, lazy walk of the tree. Each call begins from the root.
    pub fn documents(&self) -> Documents {
        Documents {
            walker: WalkDir::new(&self.root)
                .follow_links(false)
                .sort_by_file_name()
                .into_iter(),
            root: self.root.clone(),
            excludes: self.excludes.clone(),
            folders: Arc::new(AtomicU64::new(0)),
        }
    }
}

/// Lazy iterator over the files of one walk.
pub struct Documents {
    walker: walkdir::IntoIter,
    root: PathBuf,
    excludes: GlobSet,
    folders: Arc<AtomicU64>,
}

impl Documents {
    /// Shared counter of directories entered so far (the root excluded).
    pub fn folder_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.folders)
    }
}

impl Iterator for Documents {
    type Item = SourceDocument;

    fn next(&mut self) -> Option<SourceDocument> {
        loop {
            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    // walkdir reports the unreadable directory and moves on to its siblings
                    let err = TraversalError::from(e);
                    tracing::warn!(error = %err, "skipping unreadable subtree");
                    continue;
                }
            };

            let path = entry.path();
            let relative = path.strip_prefix(&self.root).unwrap_or(path);
            if !relative.as_os_str().is_empty() && self.excludes.is_match(relative) {
                if entry.file_type().is_dir() {
                    self.walker.skip_current_dir();
                }
                continue;
            }

            if entry.file_type().is_dir() {
                if entry.depth() > 0 {
                    self.folders.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(folder = %path.display(), "entering folder");
                }
                continue;
            }
            if !entry.file_type().is_file() {
                // symlinks and special files
                continue;
            }

            match describe_file(path, relative) {
                Ok(doc) => return Some(doc),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable file");
                    continue;
                }
            }
        }
    }
}

/// Build the descriptor for one file: stat, hash the full contents, count pages.
pub fn describe_file(path: &Path, relative: &Path) -> Result<SourceDocument, TraversalError> {
    let io_err = |source: std::io::Error| TraversalError::Io {
        path: path.to_path_buf(),
        source,
    };

    let metadata = std::fs::metadata(path).map_err(io_err)?;
    let modified: DateTime<Utc> = metadata
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_default();

    let id = content_hash(path).map_err(io_err)?;

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let page_count = if extension == "pdf" {
        pdf_page_count(path)
    } else {
        0
    };

    let relative_path = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");

    Ok(SourceDocument {
        id,
        absolute_path: path.to_path_buf(),
        relative_path,
        filename,
        extension,
        tags: InferredTags::from_relative_path(relative),
        size_bytes: metadata.len(),
        modified_at: modified,
        page_count,
    })
}

/// SHA-256 of the whole file, streamed in 64 KiB blocks.
pub fn content_hash(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

fn pdf_page_count(path: &Path) -> u32 {
    match lopdf::Document::load(path) {
        Ok(doc) => doc.get_pages().len() as u32,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "could not count PDF pages");
            0
        }
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn tree() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("Finance/US/Acme")).unwrap();
        fs::write(root.join("Finance/US/Acme/report.txt"), "quarterly investment").unwrap();
        fs::write(root.join("notes.txt"), "loose notes").unwrap();
        tmp
    }

    #[test]
    fn walks_recursively_and_infers_tags() {
        let tmp = tree();
        let source = PathSource::new(tmp.path()).unwrap();
        let docs: Vec<_> = source.documents().collect();
        assert_eq!(docs.len(), 2);

        let report = docs
            .iter()
            .find(|d| d.filename == "report.txt")
            .unwrap();
        assert_eq!(report.relative_path, "Finance/US/Acme/report.txt");
        assert_eq!(report.tags.domain, "Finance");
        assert_eq!(report.tags.region, "US");
        assert_eq!(report.tags.client, "Acme");
        assert_eq!(report.extension, "txt");
        assert_eq!(report.page_count, 0);
        assert_eq!(report.id.len(), 64);
    }

    #[test]
    fn walk_is_restartable_and_counts_folders() {
        let tmp = tree();
        let source = PathSource::new(tmp.path()).unwrap();
        let mut first = source.documents();
        let folders = first.folder_counter();
        assert_eq!(first.by_ref().count(), 2);
        assert_eq!(folders.load(Ordering::Relaxed), 3);
        assert_eq!(source.documents().count(), 2);
    }

    #[test]
    fn identical_content_shares_identity() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.txt"), "same bytes").unwrap();
        fs::write(tmp.path().join("b.txt"), "same bytes").unwrap();
        fs::write(tmp.path().join("c.txt"), "other bytes").unwrap();
        let docs: Vec<_> = PathSource::new(tmp.path()).unwrap().documents().collect();
        assert_eq!(docs[0].id, docs[1].id);
        assert_ne!(docs[0].id, docs[2].id);
    }

    #[test]
    fn excluded_directories_are_pruned() {
        let tmp = tree();
        fs::create_dir_all(tmp.path().join(".git")).unwrap();
        fs::write(tmp.path().join(".git/HEAD"), "ref").unwrap();
        fs::create_dir_all(tmp.path().join("Finance/.git/objects")).unwrap();
        fs::write(tmp.path().join("Finance/.git/objects/ab"), "blob").unwrap();

        let config = crate::config::Config::minimal(tmp.path().to_path_buf());
        let source = PathSource::from_config(&config.source).unwrap();
        let mut docs = source.documents();
        let folders = docs.folder_counter();
        assert!(docs.by_ref().all(|d| !d.relative_path.contains(".git")));
        // Finance, Finance/US, Finance/US/Acme; neither .git directory is entered
        assert_eq!(folders.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn missing_root_is_rejected() {
        assert!(PathSource::new("/no/such/root/anywhere").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_not_followed() {
        let tmp = tree();
        std::os::unix::fs::symlink(tmp.path(), tmp.path().join("Finance/loop")).unwrap();
        let docs: Vec<_> = PathSource::new(tmp.path()).unwrap().documents().collect();
        assert_eq!(docs.len(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_subtree_does_not_abort_walk() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tree();
        let locked = tmp.path().join("Locked");
        fs::create_dir_all(&locked).unwrap();
        fs::write(locked.join("secret.txt"), "hidden").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        let docs: Vec<_> = PathSource::new(tmp.path()).unwrap().documents().collect();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        // root can still read the directory, so only assert the siblings survived
        assert!(docs.iter().any(|d| d.filename == "notes.txt"));
        assert!(docs.iter().any(|d| d.filename == "report.txt"));
    }
}
