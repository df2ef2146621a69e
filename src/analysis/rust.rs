//! Rust analysis.

use super::scan::{self, RUST};
use super::{complexity_from, decode, AnalysisResult, CodeAnalyzer, DEFAULT_MAX_FILE_BYTES};
use crate::error::AnalysisError;
use crate::repository::SourceFile;
use regex::Regex;
use std::sync::OnceLock;

static FUNCTION: OnceLock<Regex> = OnceLock::new();
static TYPE: OnceLock<Regex> = OnceLock::new();
static BRANCH: OnceLock<Regex> = OnceLock::new();
static MATCH_ARM: OnceLock<Regex> = OnceLock::new();

/// Rust analyzer. Every `fn` item (free functions and methods) is reported;
/// structs, enums, traits and unions count as classes. Each `=>` counts as
/// one match arm.
pub struct RustAnalyzer {
    max_file_bytes: usize,
}

impl RustAnalyzer {
    pub fn new(max_file_bytes: usize) -> Self {
        Self { max_file_bytes }
    }
}

impl Default for RustAnalyzer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FILE_BYTES)
    }
}

impl CodeAnalyzer for RustAnalyzer {
    fn analyze(&self, file: &SourceFile) -> Result<AnalysisResult, AnalysisError> {
        let text = decode(file, self.max_file_bytes)?;
        let masked = scan::mask(text, &RUST);

        let function = scan::cached(
            &FUNCTION,
            r#"(?m)^[ \t]*(?:pub(?:\([^)]*\))?[ \t]+)?(?:(?:const|async|unsafe)[ \t]+|extern[ \t]+"[^"]*"[ \t]+)*fn[ \t]+([A-Za-z_]\w*)"#,
        );
        let ty = scan::cached(
            &TYPE,
            r"(?m)^[ \t]*(?:pub(?:\([^)]*\))?[ \t]+)?(?:struct|enum|trait|union)[ \t]+([A-Za-z_]\w*)",
        );
        let branch = scan::cached(&BRANCH, r"\b(?:if|for|while|loop)\b");
        let arm = scan::cached(&MATCH_ARM, r"=>");

        let branches = scan::count_matches(&masked, branch) + scan::count_matches(&masked, arm);

        Ok(AnalysisResult {
            functions: scan::collect_names(&masked, function),
            classes: scan::collect_names(&masked, ty),
            complexity: complexity_from(branches),
            lines_of_code: scan::count_code_lines(&masked),
        })
    }
}
