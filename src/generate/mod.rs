//! Test suite synthesis.
//!
//! A [`TestGenerator`] turns analyzed facts into unit and integration test
//! source text, then checks its own output with `validate_syntax`. A suite
//! that fails the check is still returned, with `syntax_valid = false`, and
//! is never executed.

mod javascript;
mod python;
mod rust;

pub use javascript::JavaScriptGenerator;
pub use python::PythonGenerator;
pub use rust::RustGenerator;

use crate::analysis::AnalysisResult;
use crate::language::LanguageTag;
use crate::repository::SourceFile;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Generated tests for one source file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedSuite {
    pub suite_id: String,
    pub source_path: PathBuf,
    pub relative_path: String,
    pub language: LanguageTag,
    pub framework: String,
    pub unit_file: String,
    pub unit_test_code: String,
    pub integration_file: String,
    pub integration_test_code: String,
    /// Number of test cases across both files.
    pub declared_tests: usize,
    pub syntax_valid: bool,
}

/// Test source produced by a generator before validation.
#[derive(Debug, Clone)]
pub struct RenderedTests {
    pub unit_file: String,
    pub unit_test_code: String,
    pub integration_file: String,
    pub integration_test_code: String,
    pub declared_tests: usize,
}

/// Synthesizes tests for one language.
pub trait TestGenerator: Send + Sync {
    /// Name of the test framework the output targets.
    fn framework(&self) -> &'static str;

    /// Produce test source text. Must not touch anything outside its inputs.
    fn render(&self, file: &SourceFile, analysis: &AnalysisResult) -> RenderedTests;

    /// Structural self-check of generated code.
    fn validate_syntax(&self, code: &str) -> bool;

    fn generate(&self, file: &SourceFile, analysis: &AnalysisResult) -> GeneratedSuite {
        let rendered = self.render(file, analysis);
        let syntax_valid = self.validate_syntax(&rendered.unit_test_code)
            && self.validate_syntax(&rendered.integration_test_code);

        GeneratedSuite {
            suite_id: suite_id(file),
            source_path: file.path.clone(),
            relative_path: file.relative_path.clone(),
            language: file.language,
            framework: self.framework().to_string(),
            unit_file: rendered.unit_file,
            unit_test_code: rendered.unit_test_code,
            integration_file: rendered.integration_file,
            integration_test_code: rendered.integration_test_code,
            declared_tests: rendered.declared_tests,
            syntax_valid,
        }
    }
}

/// Stable identifier: relative path plus a short content hash.
pub fn suite_id(file: &SourceFile) -> String {
    let hash = file.content_hash();
    format!("{}@{}", file.relative_path, &hash[..12])
}

/// Quote a string as a literal valid in both JavaScript and Python.
pub(crate) fn quoted(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("\"{}\"", value.escape_default()))
}

/// Replace characters that can't appear in an identifier.
pub(crate) fn identifier(value: &str) -> String {
    let ident: String = value
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if ident.is_empty() {
        "module".to_string()
    } else {
        ident
    }
}
