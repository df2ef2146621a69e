//! Repository-level configuration.
//!
//! Handles loading and parsing `.testotron.toml` files from the scanned
//! repository. This configuration narrows which files are discovered.

use serde::Deserialize;
use std::path::Path;

/// Name of the repository-level configuration file.
pub const REPO_CONFIG_FILE: &str = ".testotron.toml";

/// Repository-level configuration loaded from `.testotron.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct RepoConfig {
    /// Glob patterns (relative to the repository root) of files to leave out.
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Files larger than this are reported as analysis failures.
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: usize,
}

fn default_max_file_bytes() -> usize {
    crate::analysis::DEFAULT_MAX_FILE_BYTES
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            exclude: Vec::new(),
            max_file_bytes: default_max_file_bytes(),
        }
    }
}

impl RepoConfig {
    /// Load configuration from `.testotron.toml`.
    ///
    /// Returns `None` if the file doesn't exist or can't be parsed, and the
    /// default config if it is empty.
    pub fn load(repo_path: &Path) -> Option<Self> {
        let config_path = repo_path.join(REPO_CONFIG_FILE);
        if !config_path.exists() {
            return None;
        }
        let content = std::fs::read_to_string(&config_path).ok()?;
        if content.trim().is_empty() {
            return Some(Self::default());
        }
        match toml::from_str(&content) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!("Ignoring malformed {}: {}", config_path.display(), e);
                None
            }
        }
    }

    /// Whether a repository-relative path matches any exclude glob.
    pub fn is_excluded(&self, relative_path: &str) -> bool {
        self.exclude
            .iter()
            .any(|pattern| glob_match::glob_match(pattern, relative_path))
    }
}
