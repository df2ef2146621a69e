//! Language classification.
//!
//! Maps a file path (and optionally its content) to a [`LanguageTag`].
//! Classification never fails: anything unrecognized is `Unknown`.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Languages the classifier can recognize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LanguageTag {
    Python,
    Rust,
    JavaScript,
    TypeScript,
    Java,
    Kotlin,
    CSharp,
    Cpp,
    C,
    Go,
    Unknown,
}

impl LanguageTag {
    /// All known languages, excluding `Unknown`.
    pub const KNOWN: [LanguageTag; 10] = [
        LanguageTag::Python,
        LanguageTag::Rust,
        LanguageTag::JavaScript,
        LanguageTag::TypeScript,
        LanguageTag::Java,
        LanguageTag::Kotlin,
        LanguageTag::CSharp,
        LanguageTag::Cpp,
        LanguageTag::C,
        LanguageTag::Go,
    ];

    /// Human-readable name for the language.
    pub fn name(&self) -> &'static str {
        match self {
            LanguageTag::Python => "Python",
            LanguageTag::Rust => "Rust",
            LanguageTag::JavaScript => "JavaScript",
            LanguageTag::TypeScript => "TypeScript",
            LanguageTag::Java => "Java",
            LanguageTag::Kotlin => "Kotlin",
            LanguageTag::CSharp => "C#",
            LanguageTag::Cpp => "C++",
            LanguageTag::C => "C",
            LanguageTag::Go => "Go",
            LanguageTag::Unknown => "unknown",
        }
    }

    /// Directory-safe identifier, used for per-language output folders.
    pub fn slug(&self) -> &'static str {
        match self {
            LanguageTag::Python => "python",
            LanguageTag::Rust => "rust",
            LanguageTag::JavaScript => "javascript",
            LanguageTag::TypeScript => "typescript",
            LanguageTag::Java => "java",
            LanguageTag::Kotlin => "kotlin",
            LanguageTag::CSharp => "csharp",
            LanguageTag::Cpp => "cpp",
            LanguageTag::C => "c",
            LanguageTag::Go => "go",
            LanguageTag::Unknown => "unknown",
        }
    }

    /// File extensions for this language.
    pub fn file_extensions(&self) -> &'static [&'static str] {
        match self {
            LanguageTag::Python => &["py", "pyw"],
            LanguageTag::Rust => &["rs"],
            LanguageTag::JavaScript => &["js", "jsx", "mjs", "cjs"],
            LanguageTag::TypeScript => &["ts", "tsx", "mts", "cts"],
            LanguageTag::Java => &["java"],
            LanguageTag::Kotlin => &["kt", "kts"],
            LanguageTag::CSharp => &["cs"],
            LanguageTag::Cpp => &["cpp", "cc", "cxx", "hpp", "hh", "hxx"],
            LanguageTag::C => &["c", "h"],
            LanguageTag::Go => &["go"],
            LanguageTag::Unknown => &[],
        }
    }

    pub fn is_known(&self) -> bool {
        *self != LanguageTag::Unknown
    }

    fn from_extension(ext: &str) -> Self {
        let ext = ext.to_ascii_lowercase();
        Self::KNOWN
            .into_iter()
            .find(|lang| lang.file_extensions().contains(&ext.as_str()))
            .unwrap_or(LanguageTag::Unknown)
    }

    fn from_shebang(content: &[u8]) -> Self {
        let first_line = content.split(|b| *b == b'\n').next().unwrap_or_default();
        let Ok(line) = std::str::from_utf8(first_line) else {
            return LanguageTag::Unknown;
        };
        let Some(interpreter) = line.strip_prefix("#!") else {
            return LanguageTag::Unknown;
        };

        if interpreter.contains("python") {
            LanguageTag::Python
        } else if interpreter.contains("node") {
            LanguageTag::JavaScript
        } else {
            LanguageTag::Unknown
        }
    }
}

impl std::fmt::Display for LanguageTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Classify a file by extension, falling back to shebang sniffing for
/// extensionless files when content is available.
pub fn classify(path: &Path, content: Option<&[u8]>) -> LanguageTag {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => LanguageTag::from_extension(ext),
        None => content
            .map(LanguageTag::from_shebang)
            .unwrap_or(LanguageTag::Unknown),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_by_extension() {
        assert_eq!(classify(Path::new("a/b.py"), None), LanguageTag::Python);
        assert_eq!(classify(Path::new("lib.rs"), None), LanguageTag::Rust);
        assert_eq!(classify(Path::new("x.mjs"), None), LanguageTag::JavaScript);
        assert_eq!(classify(Path::new("App.tsx"), None), LanguageTag::TypeScript);
        assert_eq!(classify(Path::new("Main.java"), None), LanguageTag::Java);
        assert_eq!(classify(Path::new("main.cpp"), None), LanguageTag::Cpp);
        assert_eq!(classify(Path::new("Svc.cs"), None), LanguageTag::CSharp);
        assert_eq!(classify(Path::new("main.go"), None), LanguageTag::Go);
    }

    #[test]
    fn test_classify_extension_case_insensitive() {
        assert_eq!(classify(Path::new("SCRIPT.PY"), None), LanguageTag::Python);
    }

    #[test]
    fn test_classify_unknown_extension() {
        assert_eq!(classify(Path::new("notes.txt"), None), LanguageTag::Unknown);
        assert_eq!(classify(Path::new("data.xyz"), None), LanguageTag::Unknown);
    }

    #[test]
    fn test_classify_extension_wins_over_shebang() {
        let content = b"#!/usr/bin/env python3\n";
        assert_eq!(
            classify(Path::new("readme.md"), Some(content)),
            LanguageTag::Unknown
        );
    }

    #[test]
    fn test_classify_shebang() {
        assert_eq!(
            classify(Path::new("bin/tool"), Some(b"#!/usr/bin/env python3\nprint(1)\n")),
            LanguageTag::Python
        );
        assert_eq!(
            classify(Path::new("bin/cli"), Some(b"#!/usr/bin/env node\n")),
            LanguageTag::JavaScript
        );
        assert_eq!(
            classify(Path::new("bin/sh"), Some(b"#!/bin/sh\necho hi\n")),
            LanguageTag::Unknown
        );
    }

    #[test]
    fn test_classify_extensionless_without_content() {
        assert_eq!(classify(Path::new("Makefile"), None), LanguageTag::Unknown);
    }

    #[test]
    fn test_classify_is_pure() {
        let path = Path::new("src/module.py");
        let first = classify(path, Some(b"x = 1"));
        let second = classify(path, Some(b"x = 1"));
        assert_eq!(first, second);
    }

    #[test]
    fn test_language_display() {
        assert_eq!(format!("{}", LanguageTag::Rust), "Rust");
        assert_eq!(format!("{}", LanguageTag::CSharp), "C#");
    }

    #[test]
    fn test_slugs_are_unique() {
        let mut slugs: Vec<_> = LanguageTag::KNOWN.iter().map(|l| l.slug()).collect();
        slugs.sort();
        slugs.dedup();
        assert_eq!(slugs.len(), LanguageTag::KNOWN.len());
    }

    #[test]
    fn test_extensions_do_not_overlap() {
        for a in LanguageTag::KNOWN {
            for b in LanguageTag::KNOWN {
                if a == b {
                    continue;
                }
                for ext in a.file_extensions() {
                    assert!(!b.file_extensions().contains(ext), "{ext} in {a} and {b}");
                }
            }
        }
    }
}
