//! pytest suites for Python modules.

use super::{identifier, quoted, RenderedTests, TestGenerator};
use crate::analysis::scan::{self, PYTHON};
use crate::analysis::AnalysisResult;
use crate::repository::SourceFile;
use std::fmt::Write;

/// Statements that open an indented block.
const BLOCK_OPENERS: &[&str] = &[
    "def", "async def", "class", "if", "elif", "else", "for", "while", "try", "except",
    "finally", "with",
];

/// Generates pytest modules. The subject is imported by module name, so the
/// runner must put the source file's directory on `PYTHONPATH`.
pub struct PythonGenerator;

impl PythonGenerator {
    fn unit_tests(module: &str, analysis: &AnalysisResult) -> (String, usize) {
        let mut code = String::new();
        let mut count = 0;

        let _ = writeln!(code, "\"\"\"Generated unit tests for {module}.\"\"\"");
        code.push_str("import importlib\nimport inspect\n\n");
        let _ = writeln!(code, "subject = importlib.import_module({})", quoted(module));

        for name in &analysis.functions {
            let _ = write!(
                code,
                "\n\ndef test_{}_is_callable():\n    assert callable(getattr(subject, {}, None))\n",
                identifier(name),
                quoted(name)
            );
            count += 1;
        }

        for name in &analysis.classes {
            let _ = write!(
                code,
                "\n\ndef test_{}_is_class():\n    assert inspect.isclass(getattr(subject, {}, None))\n",
                identifier(name),
                quoted(name)
            );
            count += 1;
        }

        if count == 0 {
            code.push_str("\n\ndef test_module_imports():\n    assert subject is not None\n");
            count = 1;
        }

        (code, count)
    }

    fn integration_tests(module: &str, analysis: &AnalysisResult) -> (String, usize) {
        let public: Vec<String> = analysis
            .functions
            .iter()
            .chain(analysis.classes.iter())
            .filter(|name| !name.starts_with('_'))
            .map(|name| quoted(name))
            .collect();

        let mut code = String::new();
        let _ = writeln!(code, "\"\"\"Generated integration tests for {module}.\"\"\"");
        code.push_str("import importlib\nimport sys\n\n");
        let _ = writeln!(code, "MODULE = {}", quoted(module));
        let _ = writeln!(code, "PUBLIC_NAMES = [{}]", public.join(", "));
        code.push_str(
            r#"

def test_module_reloads_cleanly():
    sys.modules.pop(MODULE, None)
    module = importlib.import_module(MODULE)
    assert module.__name__ == MODULE


def test_public_api_is_present():
    module = importlib.import_module(MODULE)
    missing = [name for name in PUBLIC_NAMES if not hasattr(module, name)]
    assert missing == []
"#,
        );

        (code, 2)
    }
}

impl TestGenerator for PythonGenerator {
    fn framework(&self) -> &'static str {
        "pytest"
    }

    fn render(&self, file: &SourceFile, analysis: &AnalysisResult) -> RenderedTests {
        let module = file.stem();
        let file_stem = identifier(&module);
        let (unit_test_code, unit_count) = Self::unit_tests(&module, analysis);
        let (integration_test_code, integration_count) =
            Self::integration_tests(&module, analysis);

        RenderedTests {
            unit_file: format!("test_{file_stem}.py"),
            unit_test_code,
            integration_file: format!("test_{file_stem}_integration.py"),
            integration_test_code,
            declared_tests: unit_count + integration_count,
        }
    }

    fn validate_syntax(&self, code: &str) -> bool {
        if !scan::literals_closed(code, &PYTHON) || !scan::delimiters_balanced(code, &PYTHON) {
            return false;
        }

        let masked = scan::mask(code, &PYTHON);
        let lines: Vec<&str> = masked.lines().filter(|l| !l.trim().is_empty()).collect();

        for (idx, line) in lines.iter().enumerate() {
            let trimmed = line.trim();
            let opens_block = BLOCK_OPENERS.iter().any(|kw| starts_with_keyword(trimmed, kw));
            if opens_block && !trimmed.ends_with(':') {
                return false;
            }
            if trimmed.ends_with(':') {
                // The block body must be indented deeper than its header
                let Some(next) = lines.get(idx + 1) else {
                    return false;
                };
                if indent(next) <= indent(line) {
                    return false;
                }
            }
        }

        masked.lines().any(|l| l.starts_with("def test_"))
    }
}

fn starts_with_keyword(line: &str, keyword: &str) -> bool {
    line.strip_prefix(keyword).is_some_and(|rest| {
        rest.chars()
            .next()
            .map_or(true, |c| !(c.is_alphanumeric() || c == '_'))
    })
}

fn indent(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (SourceFile, AnalysisResult) {
        let file = SourceFile::new("/repo/pkg/util.py", "pkg/util.py", b"def add(a, b):\n    return a + b\n".to_vec());
        let analysis = AnalysisResult {
            functions: vec!["add".to_string(), "_helper".to_string()],
            classes: vec!["Greeter".to_string()],
            complexity: 1,
            lines_of_code: 2,
        };
        (file, analysis)
    }

    #[test]
    fn test_generate_valid_suite() {
        let (file, analysis) = fixture();
        let suite = PythonGenerator.generate(&file, &analysis);

        assert!(suite.syntax_valid);
        assert_eq!(suite.framework, "pytest");
        assert_eq!(suite.unit_file, "test_util.py");
        assert_eq!(suite.integration_file, "test_util_integration.py");
        assert_eq!(suite.declared_tests, 5);
        assert!(suite.unit_test_code.contains("import_module(\"util\")"));
        assert!(suite.unit_test_code.contains("def test_add_is_callable():"));
        assert!(suite.unit_test_code.contains("def test_Greeter_is_class():"));
        assert!(suite
            .integration_test_code
            .contains("PUBLIC_NAMES = [\"add\", \"Greeter\"]"));
    }

    #[test]
    fn test_generate_empty_analysis() {
        let file = SourceFile::new("/repo/empty.py", "empty.py", Vec::new());
        let suite = PythonGenerator.generate(&file, &AnalysisResult::empty());

        assert!(suite.syntax_valid);
        assert_eq!(suite.declared_tests, 3);
        assert!(suite.unit_test_code.contains("def test_module_imports():"));
        assert!(suite.integration_test_code.contains("PUBLIC_NAMES = []"));
    }

    #[test]
    fn test_generate_is_deterministic() {
        let (file, analysis) = fixture();
        let a = PythonGenerator.generate(&file, &analysis);
        let b = PythonGenerator.generate(&file, &analysis);
        assert_eq!(a.unit_test_code, b.unit_test_code);
        assert_eq!(a.suite_id, b.suite_id);
    }

    #[test]
    fn test_validate_accepts_simple_module() {
        let code = "import os\n\n\ndef test_x():\n    if True:\n        assert os\n";
        assert!(PythonGenerator.validate_syntax(code));
    }

    #[test]
    fn test_validate_rejects_missing_colon() {
        assert!(!PythonGenerator.validate_syntax("def test_x()\n    pass\n"));
    }

    #[test]
    fn test_validate_rejects_unindented_body() {
        assert!(!PythonGenerator.validate_syntax("def test_x():\npass\n"));
    }

    #[test]
    fn test_validate_rejects_unbalanced() {
        assert!(!PythonGenerator.validate_syntax("def test_x():\n    f(1, [2)\n"));
    }

    #[test]
    fn test_validate_rejects_unclosed_string() {
        assert!(!PythonGenerator.validate_syntax("def test_x():\n    s = 'abc\n"));
    }

    #[test]
    fn test_validate_ignores_keyword_prefixed_names() {
        let code = "def test_x():\n    tryhard = 1\n    elsewhere = 2\n";
        assert!(PythonGenerator.validate_syntax(code));
    }

    #[test]
    fn test_validate_requires_a_test() {
        assert!(!PythonGenerator.validate_syntax("def helper():\n    pass\n"));
    }
}
