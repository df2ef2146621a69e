//! Lookup table of per-language backends, built once at startup.

use crate::analysis::{BraceAnalyzer, CodeAnalyzer, PythonAnalyzer, RustAnalyzer};
use crate::generate::{JavaScriptGenerator, PythonGenerator, RustGenerator, TestGenerator};
use crate::language::LanguageTag;
use std::collections::HashMap;
use std::sync::Arc;

/// The analyzer and (optional) generator for one language.
#[derive(Clone)]
pub struct Backend {
    pub analyzer: Arc<dyn CodeAnalyzer>,
    pub generator: Option<Arc<dyn TestGenerator>>,
}

#[derive(Clone, Default)]
pub struct BackendRegistry {
    backends: HashMap<LanguageTag, Backend>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in backend. Only Python, Rust and JavaScript can
    /// generate tests; the other brace languages are analysis-only.
    pub fn with_defaults(max_file_bytes: usize) -> Self {
        let mut registry = Self::new();

        registry.register(
            LanguageTag::Python,
            Arc::new(PythonAnalyzer::new(max_file_bytes)),
            Some(Arc::new(PythonGenerator)),
        );
        registry.register(
            LanguageTag::Rust,
            Arc::new(RustAnalyzer::new(max_file_bytes)),
            Some(Arc::new(RustGenerator)),
        );

        for language in LanguageTag::KNOWN {
            let Some(analyzer) = BraceAnalyzer::new(language, max_file_bytes) else {
                continue;
            };
            let generator: Option<Arc<dyn TestGenerator>> = match analyzer.language() {
                LanguageTag::JavaScript => Some(Arc::new(JavaScriptGenerator)),
                _ => None,
            };
            registry.register(analyzer.language(), Arc::new(analyzer), generator);
        }

        registry
    }

    /// Add or replace the backend for `language`.
    pub fn register(
        &mut self,
        language: LanguageTag,
        analyzer: Arc<dyn CodeAnalyzer>,
        generator: Option<Arc<dyn TestGenerator>>,
    ) -> &mut Self {
        self.backends.insert(language, Backend { analyzer, generator });
        self
    }

    pub fn get(&self, language: LanguageTag) -> Option<&Backend> {
        self.backends.get(&language)
    }

    /// Languages with a registered backend, in a stable order.
    pub fn languages(&self) -> Vec<LanguageTag> {
        let mut languages: Vec<LanguageTag> = self.backends.keys().copied().collect();
        languages.sort();
        languages
    }
}
