//! Analysis for the curly-brace language family (JavaScript, TypeScript,
//! Java, Kotlin, C#, C, C++, Go).
//!
//! Declarations are found with per-language line patterns over masked
//! source. Method detection for Java-like languages relies on the
//! `type name(params) {` shape and will miss unusual formatting.

use super::scan::{self, BRACE};
use super::{complexity_from, decode, AnalysisResult, CodeAnalyzer};
use crate::error::AnalysisError;
use crate::language::LanguageTag;
use crate::repository::SourceFile;
use regex::Regex;

/// Words that the method pattern can capture but are never function names.
const NOT_NAMES: &[&str] = &[
    "if", "for", "while", "switch", "catch", "return", "new", "else", "throw", "sizeof", "do",
    "try", "when", "using", "lock", "foreach", "class",
];

const JS_FUNCTIONS: &[&str] = &[
    r"(?m)^[ \t]*(?:export[ \t]+)?(?:default[ \t]+)?(?:async[ \t]+)?function\*?[ \t]*([A-Za-z_$][\w$]*)",
    r"(?m)^[ \t]*(?:export[ \t]+)?(?:const|let|var)[ \t]+([A-Za-z_$][\w$]*)[^=\n]*=[ \t]*(?:async[ \t]*)?(?:\([^)]*\)|[A-Za-z_$][\w$]*)[^=\n]*=>",
];
const JS_CLASSES: &str =
    r"(?m)^[ \t]*(?:export[ \t]+)?(?:default[ \t]+)?(?:abstract[ \t]+)?(?:class|interface|enum)[ \t]+([A-Za-z_$][\w$]*)";

const C_FAMILY_FUNCTIONS: &[&str] = &[
    r"(?m)^[ \t]*(?:(?:public|private|protected|internal|static|final|abstract|synchronized|virtual|override|async|sealed|extern|unsafe|partial|native|inline|constexpr)[ \t]+)*[\w<>\[\],.?*&:]+(?:[ \t]+[\w<>\[\],.?*&:]+)*?[ \t*&]+(?:\w+::)*([A-Za-z_]\w*)[ \t]*\([^;{}]*\)[^;{}()]*\{",
];
const C_FAMILY_CLASSES: &str =
    r"\b(?:enum[ \t]+class|class|interface|enum|struct|record)[ \t]+([A-Za-z_]\w*)";

const KOTLIN_FUNCTIONS: &[&str] =
    &[r"\bfun[ \t]+(?:<[^>]*>[ \t]*)?(?:[\w.<>, ?]+\.)?([A-Za-z_]\w*)"];
const KOTLIN_CLASSES: &str = r"\b(?:class|interface|object)[ \t]+([A-Za-z_]\w*)";

const GO_FUNCTIONS: &[&str] = &[r"(?m)^func[ \t]+(?:\([^)]*\)[ \t]*)?([A-Za-z_]\w*)"];
const GO_CLASSES: &str = r"(?m)^type[ \t]+([A-Za-z_]\w*)[ \t]+(?:struct|interface)";

/// Analyzer for one brace-family language.
pub struct BraceAnalyzer {
    language: LanguageTag,
    functions: Vec<Regex>,
    classes: Regex,
    branches: Regex,
    max_file_bytes: usize,
}

impl BraceAnalyzer {
    /// Build the analyzer for `language`. Returns `None` for languages
    /// outside the brace family.
    pub fn new(language: LanguageTag, max_file_bytes: usize) -> Option<Self> {
        let (functions, classes, branches): (&[&str], &str, &str) = match language {
            LanguageTag::JavaScript | LanguageTag::TypeScript => (
                JS_FUNCTIONS,
                JS_CLASSES,
                r"\b(?:if|for|while|case|catch)\b",
            ),
            LanguageTag::Java | LanguageTag::C | LanguageTag::Cpp => (
                C_FAMILY_FUNCTIONS,
                C_FAMILY_CLASSES,
                r"\b(?:if|for|while|case|catch)\b",
            ),
            LanguageTag::CSharp => (
                C_FAMILY_FUNCTIONS,
                C_FAMILY_CLASSES,
                r"\b(?:if|for|foreach|while|case|catch)\b",
            ),
            LanguageTag::Kotlin => (
                KOTLIN_FUNCTIONS,
                KOTLIN_CLASSES,
                r"\b(?:if|for|while|when|catch)\b",
            ),
            LanguageTag::Go => (GO_FUNCTIONS, GO_CLASSES, r"\b(?:if|for|case)\b"),
            LanguageTag::Python | LanguageTag::Rust | LanguageTag::Unknown => return None,
        };

        let compile = |p: &str| Regex::new(p).expect("static regex must compile");
        Some(Self {
            language,
            functions: functions.iter().map(|p| compile(p)).collect(),
            classes: compile(classes),
            branches: compile(branches),
            max_file_bytes,
        })
    }

    pub fn language(&self) -> LanguageTag {
        self.language
    }

    fn function_names(&self, masked: &str) -> Vec<String> {
        // Merge all patterns' matches by position so names keep source order
        let mut found: Vec<(usize, String)> = Vec::new();
        for pattern in &self.functions {
            for caps in pattern.captures_iter(masked) {
                if let Some(m) = caps.get(1) {
                    found.push((m.start(), m.as_str().to_string()));
                }
            }
        }
        found.sort_by_key(|(pos, _)| *pos);

        let mut names: Vec<String> = Vec::new();
        for (_, name) in found {
            if NOT_NAMES.contains(&name.as_str()) || names.contains(&name) {
                continue;
            }
            names.push(name);
        }
        names
    }
}

impl CodeAnalyzer for BraceAnalyzer {
    fn analyze(&self, file: &SourceFile) -> Result<AnalysisResult, AnalysisError> {
        let text = decode(file, self.max_file_bytes)?;
        let masked = scan::mask(text, &BRACE);

        let classes = scan::collect_names(&masked, &self.classes)
            .into_iter()
            .filter(|name| !NOT_NAMES.contains(&name.as_str()))
            .collect();

        Ok(AnalysisResult {
            functions: self.function_names(&masked),
            classes,
            complexity: complexity_from(scan::count_matches(&masked, &self.branches)),
            lines_of_code: scan::count_code_lines(&masked),
        })
    }
}
