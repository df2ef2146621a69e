//! Repository discovery.
//!
//! A [`RepositoryProvider`] yields the ordered set of source files a run
//! works on. [`LocalRepository`] walks a directory on disk.

use crate::error::RepositoryError;
use crate::language::{classify, LanguageTag};
use crate::repo_config::RepoConfig;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Directories never descended into.
const SKIP_DIRECTORIES: &[&str] = &[
    "target",
    "node_modules",
    "dist",
    "build",
    "__pycache__",
    "venv",
    "coverage",
];

/// A rooted file set. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryHandle {
    pub root: PathBuf,
    /// Where the checkout came from, if it is a clone.
    pub origin: Option<String>,
}

impl RepositoryHandle {
    pub fn local(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            origin: None,
        }
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }
}

/// One discovered file. Read-only after discovery.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    /// Path relative to the repository root, with `/` separators.
    pub relative_path: String,
    pub language: LanguageTag,
    pub content: Vec<u8>,
}

impl SourceFile {
    /// Build a source file, classifying it from its path and content.
    pub fn new(path: impl Into<PathBuf>, relative_path: impl Into<String>, content: Vec<u8>) -> Self {
        let path = path.into();
        let language = classify(&path, Some(&content));
        Self {
            path,
            relative_path: relative_path.into(),
            language,
            content,
        }
    }

    /// SHA-256 of the content, hex encoded.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.content);
        format!("{:x}", hasher.finalize())
    }

    /// File name without extension, used to name generated suites.
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "module".to_string())
    }
}

/// Supplies the files of one repository.
pub trait RepositoryProvider: Send + Sync {
    fn handle(&self) -> &RepositoryHandle;

    /// Enumerate files in a stable order.
    fn files(&self) -> Result<Vec<SourceFile>, RepositoryError>;
}

/// A repository on the local filesystem.
pub struct LocalRepository {
    handle: RepositoryHandle,
    excluded_dirs: Vec<PathBuf>,
}

impl LocalRepository {
    pub fn new(handle: RepositoryHandle) -> Self {
        Self {
            handle,
            excluded_dirs: Vec::new(),
        }
    }

    /// Leave a directory out of discovery (e.g. the generated-suite output
    /// directory when it lives inside the repository).
    pub fn exclude_dir(mut self, dir: &Path) -> Self {
        let dir = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
        self.excluded_dirs.push(dir);
        self
    }

    fn is_excluded_dir(&self, path: &Path) -> bool {
        if self.excluded_dirs.is_empty() {
            return false;
        }
        let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        self.excluded_dirs.iter().any(|d| path.starts_with(d))
    }
}

impl RepositoryProvider for LocalRepository {
    fn handle(&self) -> &RepositoryHandle {
        &self.handle
    }

    fn files(&self) -> Result<Vec<SourceFile>, RepositoryError> {
        let root = &self.handle.root;
        if !root.exists() {
            return Err(RepositoryError::Missing { path: root.clone() });
        }
        if !root.is_dir() {
            return Err(RepositoryError::NotADirectory { path: root.clone() });
        }

        let repo_config = RepoConfig::load(root).unwrap_or_default();
        let mut files = Vec::new();

        for entry in walkdir::WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                // Don't filter the root directory itself (may be a temp dir starting with .)
                if e.depth() == 0 {
                    return true;
                }
                let name = e.file_name().to_string_lossy();
                if name.starts_with('.') {
                    return false;
                }
                if e.file_type().is_dir() {
                    return !SKIP_DIRECTORIES.contains(&name.as_ref())
                        && !self.is_excluded_dir(e.path());
                }
                true
            })
        {
            let entry = entry.map_err(|source| RepositoryError::Walk {
                path: root.clone(),
                source,
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative_path = relative_path(root, path);
            if repo_config.is_excluded(&relative_path) {
                tracing::debug!("Excluded by {}: {}", crate::repo_config::REPO_CONFIG_FILE, relative_path);
                continue;
            }

            let content = match std::fs::read(path) {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!("Failed to read file {:?}: {}", path, e);
                    continue;
                }
            };

            files.push(SourceFile::new(path, relative_path, content));
        }

        files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        Ok(files)
    }
}

/// A fixed, in-memory file set. Useful for tests and for callers that
/// already hold file contents.
pub struct InMemoryRepository {
    handle: RepositoryHandle,
    files: Vec<(String, Vec<u8>)>,
}

impl InMemoryRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            handle: RepositoryHandle::local(root),
            files: Vec::new(),
        }
    }

    pub fn with_file(mut self, relative_path: &str, content: impl Into<Vec<u8>>) -> Self {
        self.files.push((relative_path.to_string(), content.into()));
        self
    }
}

impl RepositoryProvider for InMemoryRepository {
    fn handle(&self) -> &RepositoryHandle {
        &self.handle
    }

    fn files(&self) -> Result<Vec<SourceFile>, RepositoryError> {
        let mut files: Vec<_> = self
            .files
            .iter()
            .map(|(rel, content)| {
                SourceFile::new(self.handle.root.join(rel), rel.clone(), content.clone())
            })
            .collect();
        files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        Ok(files)
    }
}

fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
