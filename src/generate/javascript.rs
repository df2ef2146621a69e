//! `node --test` suites for JavaScript modules.

use super::{identifier, quoted, RenderedTests, TestGenerator};
use crate::analysis::scan::{self, BRACE};
use crate::analysis::AnalysisResult;
use crate::repository::SourceFile;
use std::fmt::Write;

/// Generates `node:test` suites. The subject is loaded with a dynamic
/// `import()`, which handles both CommonJS and ES modules; CommonJS exports
/// are merged from `default`.
pub struct JavaScriptGenerator;

fn preamble(code: &mut String, kind: &str, file: &SourceFile) {
    let _ = writeln!(code, "// Generated {kind} tests for {}", file.relative_path);
    code.push_str("const { test } = require('node:test');\n");
    code.push_str("const assert = require('node:assert');\n");
    code.push_str("const { pathToFileURL } = require('node:url');\n\n");
    let _ = writeln!(
        code,
        "const SUBJECT = {};",
        quoted(&file.path.display().to_string())
    );
    code.push_str(
        "const load = async () => {\n  const mod = await import(pathToFileURL(SUBJECT).href);\n  return { ...(mod.default || {}), ...mod };\n};\n",
    );
}

impl TestGenerator for JavaScriptGenerator {
    fn framework(&self) -> &'static str {
        "node-test"
    }

    fn render(&self, file: &SourceFile, analysis: &AnalysisResult) -> RenderedTests {
        let stem = identifier(&file.stem());

        let mut unit = String::new();
        preamble(&mut unit, "unit", file);
        let mut unit_count = 0;

        for name in &analysis.functions {
            let _ = write!(
                unit,
                "\ntest({}, async () => {{\n  const api = await load();\n  assert.strictEqual(typeof api[{}], 'function');\n}});\n",
                quoted(&format!("{name} is exported as a function")),
                quoted(name)
            );
            unit_count += 1;
        }
        for name in &analysis.classes {
            let _ = write!(
                unit,
                "\ntest({}, async () => {{\n  const api = await load();\n  assert.ok(api[{}] !== undefined);\n}});\n",
                quoted(&format!("{name} is exported")),
                quoted(name)
            );
            unit_count += 1;
        }
        if unit_count == 0 {
            unit.push_str(
                "\ntest('module loads', async () => {\n  const api = await load();\n  assert.ok(api);\n});\n",
            );
            unit_count = 1;
        }

        let mut integration = String::new();
        preamble(&mut integration, "integration", file);
        integration.push_str(
            "\ntest('module loads twice to the same exports', async () => {\n  const first = await load();\n  const second = await load();\n  assert.deepStrictEqual(Object.keys(first).sort(), Object.keys(second).sort());\n});\n",
        );

        RenderedTests {
            unit_file: format!("{stem}.unit.test.js"),
            unit_test_code: unit,
            integration_file: format!("{stem}.integration.test.js"),
            integration_test_code: integration,
            declared_tests: unit_count + 1,
        }
    }

    fn validate_syntax(&self, code: &str) -> bool {
        scan::literals_closed(code, &BRACE)
            && scan::delimiters_balanced(code, &BRACE)
            && scan::mask(code, &BRACE).contains("test(")
    }
}
