//! On-disk copies of generated suites.
//!
//! Layout: `<test_directory>/<run timestamp>/<language>/tests/<source path>/<test file>`.
//! The source file name, extension included, is its own directory so that
//! `util.py` and `util.pyw` never share test files.

use crate::generate::GeneratedSuite;
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};

pub struct SuiteStore {
    run_dir: PathBuf,
}

impl SuiteStore {
    /// A store for one run, rooted at a timestamped directory.
    pub fn new(test_directory: &Path, started_at: DateTime<Local>) -> Self {
        Self {
            run_dir: test_directory.join(started_at.format("%Y%m%d_%H%M%S").to_string()),
        }
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Directory the suite's files land in.
    pub fn suite_dir(&self, suite: &GeneratedSuite) -> PathBuf {
        self.run_dir
            .join(suite.language.slug())
            .join("tests")
            .join(&suite.relative_path)
    }

    /// Write both test files, returning their paths.
    pub async fn write(&self, suite: &GeneratedSuite) -> Result<Vec<PathBuf>> {
        let dir = self.suite_dir(suite);
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let mut written = Vec::with_capacity(2);
        for (name, code) in [
            (&suite.unit_file, &suite.unit_test_code),
            (&suite.integration_file, &suite.integration_test_code),
        ] {
            let path = dir.join(name);
            tokio::fs::write(&path, code)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            written.push(path);
        }

        tracing::debug!("Stored suite {} in {}", suite.suite_id, dir.display());
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::LanguageTag;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn suite(relative_path: &str) -> GeneratedSuite {
        GeneratedSuite {
            suite_id: format!("{relative_path}@0123456789ab"),
            source_path: PathBuf::from("/repo").join(relative_path),
            relative_path: relative_path.to_string(),
            language: LanguageTag::Python,
            framework: "pytest".to_string(),
            unit_file: "test_util.py".to_string(),
            unit_test_code: "def test_a():\n    pass\n".to_string(),
            integration_file: "test_util_integration.py".to_string(),
            integration_test_code: "def test_b():\n    pass\n".to_string(),
            declared_tests: 2,
            syntax_valid: true,
        }
    }

    fn started_at() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
    }

    #[test]
    fn test_run_dir_is_timestamped() {
        let store = SuiteStore::new(Path::new("/out"), started_at());
        assert_eq!(store.run_dir(), Path::new("/out/20240309_140507"));
    }

    #[test]
    fn test_suite_dir_mirrors_source_layout() {
        let store = SuiteStore::new(Path::new("/out"), started_at());
        assert_eq!(
            store.suite_dir(&suite("pkg/sub/util.py")),
            PathBuf::from("/out/20240309_140507/python/tests/pkg/sub/util.py")
        );
        assert_eq!(
            store.suite_dir(&suite("util.py")),
            PathBuf::from("/out/20240309_140507/python/tests/util.py")
        );
    }

    #[tokio::test]
    async fn test_write_creates_both_files() {
        let temp_dir = TempDir::new().unwrap();
        let store = SuiteStore::new(temp_dir.path(), started_at());

        let written = store.write(&suite("pkg/util.py")).await.unwrap();

        assert_eq!(written.len(), 2);
        let unit = std::fs::read_to_string(&written[0]).unwrap();
        assert!(unit.contains("def test_a"));
        assert!(written[1].ends_with("python/tests/pkg/util.py/test_util_integration.py"));
    }

    #[tokio::test]
    async fn test_same_stem_sources_do_not_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        let store = SuiteStore::new(temp_dir.path(), started_at());

        let mut first = suite("a/util.py");
        first.unit_test_code = "def test_from_py():\n    pass\n".to_string();
        let mut second = suite("a/util.pyw");
        second.unit_test_code = "def test_from_pyw():\n    pass\n".to_string();

        let first_paths = store.write(&first).await.unwrap();
        let second_paths = store.write(&second).await.unwrap();

        assert_ne!(first_paths[0], second_paths[0]);
        assert!(std::fs::read_to_string(&first_paths[0]).unwrap().contains("test_from_py()"));
        assert!(std::fs::read_to_string(&second_paths[0]).unwrap().contains("test_from_pyw()"));
    }

    #[tokio::test]
    async fn test_write_fails_when_root_is_a_file() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("blocker");
        std::fs::write(&blocker, "x").unwrap();

        let store = SuiteStore::new(&blocker, started_at());
        assert!(store.write(&suite("util.py")).await.is_err());
    }
}
