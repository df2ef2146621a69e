//! Per-language structural analysis.
//!
//! Every analyzer extracts the same facts: top-level functions, classes (or
//! the closest equivalent: structs, enums, traits, interfaces), an
//! approximate cyclomatic complexity and a count of code lines.
//!
//! Complexity is `1 + number of branching keywords` found outside comments
//! and string literals. It is a known-approximate heuristic, not a
//! control-flow-graph computation: a keyword inside a macro or an unusual
//! literal form (raw strings, f-string expressions) may be miscounted.

mod brace;
mod python;
mod rust;
pub mod scan;

pub use brace::BraceAnalyzer;
pub use python::PythonAnalyzer;
pub use rust::RustAnalyzer;

use crate::error::AnalysisError;
use crate::repository::SourceFile;
use serde::{Deserialize, Serialize};

/// Files above this size are rejected unless configured otherwise.
pub const DEFAULT_MAX_FILE_BYTES: usize = 100_000;

/// Structural facts about one source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Function names in source order.
    pub functions: Vec<String>,
    /// Class-like type names in source order.
    pub classes: Vec<String>,
    /// Always at least 1.
    pub complexity: u32,
    pub lines_of_code: usize,
}

impl AnalysisResult {
    /// The result for a file with no code in it.
    pub fn empty() -> Self {
        Self {
            functions: Vec::new(),
            classes: Vec::new(),
            complexity: 1,
            lines_of_code: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty() && self.classes.is_empty()
    }
}

/// Extracts [`AnalysisResult`]s. Implementations must be deterministic.
pub trait CodeAnalyzer: Send + Sync {
    fn analyze(&self, file: &SourceFile) -> Result<AnalysisResult, AnalysisError>;
}

/// Check the size limit and decode the content as UTF-8.
pub(crate) fn decode(file: &SourceFile, max_bytes: usize) -> Result<&str, AnalysisError> {
    if file.content.len() > max_bytes {
        return Err(AnalysisError::TooLarge {
            size: file.content.len(),
            limit: max_bytes,
        });
    }
    std::str::from_utf8(&file.content).map_err(|e| AnalysisError::Decode {
        offset: e.valid_up_to(),
    })
}

pub(crate) fn complexity_from(branches: usize) -> u32 {
    u32::try_from(branches).unwrap_or(u32::MAX - 1).saturating_add(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_rejects_invalid_utf8() {
        let file = SourceFile::new("/r/a.py", "a.py", vec![b'x', 0xff, 0xfe]);
        assert_eq!(decode(&file, 100), Err(AnalysisError::Decode { offset: 1 }));
    }

    #[test]
    fn test_decode_rejects_oversized() {
        let file = SourceFile::new("/r/a.py", "a.py", vec![b'x'; 11]);
        assert_eq!(
            decode(&file, 10),
            Err(AnalysisError::TooLarge {
                size: 11,
                limit: 10
            })
        );
    }

    #[test]
    fn test_decode_accepts_empty() {
        let file = SourceFile::new("/r/a.py", "a.py", Vec::new());
        assert_eq!(decode(&file, 10), Ok(""));
    }

    #[test]
    fn test_empty_result() {
        let result = AnalysisResult::empty();
        assert_eq!(result.complexity, 1);
        assert_eq!(result.lines_of_code, 0);
        assert!(result.is_empty());
    }

    #[test]
    fn test_complexity_from() {
        assert_eq!(complexity_from(0), 1);
        assert_eq!(complexity_from(4), 5);
    }
}
