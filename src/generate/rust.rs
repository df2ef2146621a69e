//! Standalone `rustc --test` suites for Rust source files.
//!
//! The subject file is pulled in with `#[path = "..."] mod subject;`, so only
//! its top-level `pub` items are reachable. Generic items are left out since
//! naming them without type arguments does not compile.

use super::{identifier, RenderedTests, TestGenerator};
use crate::analysis::scan::{self, RUST};
use crate::analysis::AnalysisResult;
use crate::repository::SourceFile;
use regex::Regex;
use std::fmt::Write;
use std::sync::OnceLock;

static PUB_FN: OnceLock<Regex> = OnceLock::new();
static PUB_TYPE: OnceLock<Regex> = OnceLock::new();

pub struct RustGenerator;

/// Top-level items a generated test can name.
struct Reachable {
    functions: Vec<String>,
    types: Vec<String>,
}

impl Reachable {
    fn find(file: &SourceFile, analysis: &AnalysisResult) -> Self {
        let text = String::from_utf8_lossy(&file.content);
        let masked = scan::mask(&text, &RUST);

        let pub_fn = scan::cached(
            &PUB_FN,
            r"(?m)^pub[ \t]+(?:(?:const|async|unsafe)[ \t]+)*fn[ \t]+([A-Za-z_]\w*)[ \t]*\(",
        );
        let pub_type = scan::cached(
            &PUB_TYPE,
            r"(?m)^pub[ \t]+(?:struct|enum)[ \t]+([A-Za-z_]\w*)[ \t]*[{;(]",
        );

        let pub_fns = scan::collect_names(&masked, pub_fn);
        let pub_types = scan::collect_names(&masked, pub_type);

        Self {
            functions: analysis
                .functions
                .iter()
                .filter(|f| pub_fns.contains(f))
                .cloned()
                .collect(),
            types: analysis
                .classes
                .iter()
                .filter(|c| pub_types.contains(c))
                .cloned()
                .collect(),
        }
    }
}

fn header(code: &mut String, kind: &str, file: &SourceFile) {
    let _ = writeln!(code, "//! Generated {kind} tests for {}.", file.relative_path);
    code.push_str("#![allow(dead_code, unused_imports, unused_variables)]\n\n");
    let _ = writeln!(
        code,
        "#[path = {:?}]\nmod subject;",
        file.path.display().to_string()
    );
}

impl TestGenerator for RustGenerator {
    fn framework(&self) -> &'static str {
        "rustc-test"
    }

    fn render(&self, file: &SourceFile, analysis: &AnalysisResult) -> RenderedTests {
        let reachable = Reachable::find(file, analysis);
        let stem = identifier(&file.stem());

        let mut unit = String::new();
        header(&mut unit, "unit", file);
        unit.push_str("\n#[test]\nfn subject_module_compiles() {}\n");
        let mut unit_count = 1;

        for name in &reachable.functions {
            let _ = write!(
                unit,
                "\n#[test]\nfn {}_is_defined() {{\n    let _item = subject::{};\n}}\n",
                identifier(name),
                name
            );
            unit_count += 1;
        }
        for name in &reachable.types {
            let _ = write!(
                unit,
                "\n#[test]\nfn {}_type_is_sized() {{\n    let _ = std::mem::size_of::<subject::{}>();\n}}\n",
                identifier(name),
                name
            );
            unit_count += 1;
        }

        let mut integration = String::new();
        header(&mut integration, "integration", file);
        integration.push_str("\n#[test]\nfn public_items_resolve_together() {\n");
        for name in &reachable.functions {
            let _ = writeln!(integration, "    let _ = subject::{name};");
        }
        for name in &reachable.types {
            let _ = writeln!(
                integration,
                "    let _ = std::any::type_name::<subject::{name}>();"
            );
        }
        integration.push_str("}\n");

        RenderedTests {
            unit_file: format!("{stem}_unit_tests.rs"),
            unit_test_code: unit,
            integration_file: format!("{stem}_integration_tests.rs"),
            integration_test_code: integration,
            declared_tests: unit_count + 1,
        }
    }

    fn validate_syntax(&self, code: &str) -> bool {
        scan::literals_closed(code, &RUST)
            && scan::delimiters_balanced(code, &RUST)
            && code.contains("#[test]")
    }
}
