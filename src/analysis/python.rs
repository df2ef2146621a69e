//! Python analysis.

use super::scan::{self, PYTHON};
use super::{complexity_from, decode, AnalysisResult, CodeAnalyzer, DEFAULT_MAX_FILE_BYTES};
use crate::error::AnalysisError;
use crate::repository::SourceFile;
use regex::Regex;
use std::sync::OnceLock;

static FUNCTION: OnceLock<Regex> = OnceLock::new();
static CLASS: OnceLock<Regex> = OnceLock::new();
static BRANCH: OnceLock<Regex> = OnceLock::new();

/// Python analyzer.
///
/// Only module-level `def`/`class` statements are reported, since those are
/// what a generated test can reach by importing the module.
pub struct PythonAnalyzer {
    max_file_bytes: usize,
}

impl PythonAnalyzer {
    pub fn new(max_file_bytes: usize) -> Self {
        Self { max_file_bytes }
    }
}

impl Default for PythonAnalyzer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FILE_BYTES)
    }
}

impl CodeAnalyzer for PythonAnalyzer {
    fn analyze(&self, file: &SourceFile) -> Result<AnalysisResult, AnalysisError> {
        let text = decode(file, self.max_file_bytes)?;
        let masked = scan::mask(text, &PYTHON);

        let function = scan::cached(&FUNCTION, r"(?m)^(?:async[ \t]+)?def[ \t]+([A-Za-z_]\w*)");
        let class = scan::cached(&CLASS, r"(?m)^class[ \t]+([A-Za-z_]\w*)");
        let branch = scan::cached(&BRANCH, r"\b(?:if|elif|for|while|except|case)\b");

        Ok(AnalysisResult {
            functions: scan::collect_names(&masked, function),
            classes: scan::collect_names(&masked, class),
            complexity: complexity_from(scan::count_matches(&masked, branch)),
            lines_of_code: scan::count_code_lines(&masked),
        })
    }
}
