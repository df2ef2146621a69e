//! Test execution.
//!
//! A [`TestRunner`] executes one generated suite and always produces a
//! [`TestOutcome`], whether the tests failed, the toolchain could not be
//! started, or the suite ran past its timeout.

use crate::analysis::scan;
use crate::config::RunnerCommands;
use crate::generate::GeneratedSuite;
use crate::language::LanguageTag;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::Path;
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use tokio::process::Command;

/// Maximum toolchain output kept for logging.
pub const MAX_OUTPUT_BYTES: usize = 10_000;

pub const TIMEOUT_ERROR: &str = "timeout";
pub const COMPILE_ERROR: &str = "compile error";

static PYTEST_PASSED: OnceLock<Regex> = OnceLock::new();
static PYTEST_FAILED: OnceLock<Regex> = OnceLock::new();
static PYTEST_ERRORS: OnceLock<Regex> = OnceLock::new();
static CARGO_RESULT: OnceLock<Regex> = OnceLock::new();
static TAP_PASS: OnceLock<Regex> = OnceLock::new();
static TAP_FAIL: OnceLock<Regex> = OnceLock::new();

/// Result of executing one suite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub suite_id: String,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub error: Option<String>,
}

impl TestOutcome {
    pub fn new(suite_id: impl Into<String>, passed: usize, failed: usize, duration_ms: u64) -> Self {
        Self {
            suite_id: suite_id.into(),
            passed,
            failed,
            duration_ms,
            error: None,
        }
    }

    /// The suite ran out of time. Every declared test counts as failed.
    pub fn timeout(suite: &GeneratedSuite, duration_ms: u64) -> Self {
        Self {
            suite_id: suite.suite_id.clone(),
            passed: 0,
            failed: suite.declared_tests.max(1),
            duration_ms,
            error: Some(TIMEOUT_ERROR.to_string()),
        }
    }

    /// The suite could not be executed at all.
    pub fn fault(suite: &GeneratedSuite, message: impl std::fmt::Display, duration_ms: u64) -> Self {
        Self {
            suite_id: suite.suite_id.clone(),
            passed: 0,
            failed: suite.declared_tests.max(1),
            duration_ms,
            error: Some(format!("runner fault: {message}")),
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.error.as_deref() == Some(TIMEOUT_ERROR)
    }
}

/// Executes a suite in isolation.
///
/// Implementations must not return before the suite finishes or `timeout`
/// elapses, and must report infrastructure problems through
/// [`TestOutcome::error`] rather than panicking.
pub trait TestRunner: Send + Sync + 'static {
    fn run(
        &self,
        suite: GeneratedSuite,
        timeout: Duration,
    ) -> impl Future<Output = TestOutcome> + Send;
}

/// Runs suites with the language toolchains installed on the host.
///
/// Each invocation gets a fresh temporary directory holding the suite's
/// files; children are killed when their timeout elapses.
pub struct ProcessRunner {
    commands: RunnerCommands,
}

/// What a toolchain invocation amounted to.
#[derive(Debug)]
enum Execution {
    Counted {
        passed: usize,
        failed: usize,
        success: bool,
    },
    CompileError,
    TimedOut,
    Fault(String),
}

#[derive(Debug)]
enum CommandResult {
    Exited { success: bool, output: String },
    TimedOut,
    SpawnFailed(String),
}

impl ProcessRunner {
    pub fn new(commands: RunnerCommands) -> Self {
        Self { commands }
    }

    async fn run_pytest(&self, suite: &GeneratedSuite, dir: &Path, timeout: Duration) -> Execution {
        let import_root = suite
            .source_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(dir);

        let mut command = Command::new(&self.commands.python);
        command
            .args(["-m", "pytest", "-q", "-p", "no:cacheprovider"])
            .arg(&suite.unit_file)
            .arg(&suite.integration_file)
            .current_dir(dir)
            .env("PYTHONPATH", import_root)
            .env("PYTHONDONTWRITEBYTECODE", "1");

        match run_command(command, timeout).await {
            CommandResult::Exited { success, output } => {
                log_output(suite, &output);
                let (passed, failed) = parse_pytest_counts(&output);
                Execution::Counted {
                    passed,
                    failed,
                    success,
                }
            }
            CommandResult::TimedOut => Execution::TimedOut,
            CommandResult::SpawnFailed(reason) => Execution::Fault(reason),
        }
    }

    async fn run_rustc(&self, suite: &GeneratedSuite, dir: &Path, timeout: Duration) -> Execution {
        let start = Instant::now();
        let mut passed = 0;
        let mut failed = 0;
        let mut success = true;

        // The unit and integration files each include the subject, so they
        // are separate test crates.
        for (idx, file) in [&suite.unit_file, &suite.integration_file].into_iter().enumerate() {
            let binary = dir.join(format!("suite_{idx}"));
            let mut compile = Command::new(&self.commands.rustc);
            compile
                .args(["--edition", "2021", "--test", "-A", "warnings"])
                .arg(file)
                .arg("-o")
                .arg(&binary)
                .current_dir(dir);

            match run_command(compile, timeout.saturating_sub(start.elapsed())).await {
                CommandResult::Exited { success: true, .. } => {}
                CommandResult::Exited { success: false, output } => {
                    tracing::debug!("{} failed to compile:\n{}", file, truncate_output(&output, MAX_OUTPUT_BYTES));
                    return Execution::CompileError;
                }
                CommandResult::TimedOut => return Execution::TimedOut,
                CommandResult::SpawnFailed(reason) => return Execution::Fault(reason),
            }

            let mut test = Command::new(&binary);
            test.arg("--test-threads=1").current_dir(dir);

            match run_command(test, timeout.saturating_sub(start.elapsed())).await {
                CommandResult::Exited {
                    success: ok,
                    output,
                } => {
                    log_output(suite, &output);
                    let (p, f) = parse_cargo_counts(&output);
                    if !ok && p + f == 0 {
                        // Crashed before libtest printed its summary
                        return Execution::Fault("test binary exited without reporting results".to_string());
                    }
                    passed += p;
                    failed += f;
                    success &= ok;
                }
                CommandResult::TimedOut => return Execution::TimedOut,
                CommandResult::SpawnFailed(reason) => return Execution::Fault(reason),
            }
        }

        Execution::Counted {
            passed,
            failed,
            success,
        }
    }

    async fn run_node(&self, suite: &GeneratedSuite, dir: &Path, timeout: Duration) -> Execution {
        let mut command = Command::new(&self.commands.node);
        command
            .args(["--test", "--test-reporter=tap"])
            .arg(&suite.unit_file)
            .arg(&suite.integration_file)
            .current_dir(dir);

        match run_command(command, timeout).await {
            CommandResult::Exited { success, output } => {
                log_output(suite, &output);
                let (passed, failed) = parse_tap_counts(&output);
                Execution::Counted {
                    passed,
                    failed,
                    success,
                }
            }
            CommandResult::TimedOut => Execution::TimedOut,
            CommandResult::SpawnFailed(reason) => Execution::Fault(reason),
        }
    }

    async fn execute(&self, suite: &GeneratedSuite, dir: &Path, timeout: Duration) -> Execution {
        for (name, code) in [
            (&suite.unit_file, &suite.unit_test_code),
            (&suite.integration_file, &suite.integration_test_code),
        ] {
            if let Err(e) = tokio::fs::write(dir.join(name), code).await {
                return Execution::Fault(format!("failed to write {name}: {e}"));
            }
        }

        match suite.language {
            LanguageTag::Python => self.run_pytest(suite, dir, timeout).await,
            LanguageTag::Rust => self.run_rustc(suite, dir, timeout).await,
            LanguageTag::JavaScript => self.run_node(suite, dir, timeout).await,
            other => Execution::Fault(format!("no runner for {other}")),
        }
    }
}

impl TestRunner for ProcessRunner {
    async fn run(&self, suite: GeneratedSuite, timeout: Duration) -> TestOutcome {
        let start = Instant::now();

        let execution = match tempfile::Builder::new().prefix("testotron-").tempdir() {
            Ok(dir) => self.execute(&suite, dir.path(), timeout).await,
            Err(e) => Execution::Fault(format!("failed to create isolation directory: {e}")),
        };

        let outcome = outcome_from(&suite, execution, start.elapsed().as_millis() as u64);
        tracing::debug!(
            "Ran {}: {} passed, {} failed ({}ms)",
            outcome.suite_id,
            outcome.passed,
            outcome.failed,
            outcome.duration_ms
        );
        outcome
    }
}

fn outcome_from(suite: &GeneratedSuite, execution: Execution, duration_ms: u64) -> TestOutcome {
    match execution {
        Execution::Counted {
            passed,
            failed,
            success,
        } => {
            if passed + failed == 0 && !success {
                // The toolchain bailed out before reporting any test
                return TestOutcome::fault(suite, "no test results reported", duration_ms);
            }
            if failed == 0 && !success {
                return TestOutcome {
                    error: Some("runner fault: toolchain exited with failure but reported no failed tests".to_string()),
                    ..TestOutcome::new(&suite.suite_id, passed, 1, duration_ms)
                };
            }
            TestOutcome::new(&suite.suite_id, passed, failed, duration_ms)
        }
        Execution::CompileError => TestOutcome {
            error: Some(COMPILE_ERROR.to_string()),
            ..TestOutcome::new(&suite.suite_id, 0, suite.declared_tests.max(1), duration_ms)
        },
        Execution::TimedOut => TestOutcome::timeout(suite, duration_ms),
        Execution::Fault(reason) => TestOutcome::fault(suite, reason, duration_ms),
    }
}

/// Run a command to completion, killing it if `timeout` elapses.
async fn run_command(mut command: Command, timeout: Duration) -> CommandResult {
    let program = command.as_std().get_program().to_string_lossy().to_string();

    let child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();

    let child = match child {
        Ok(c) => c,
        Err(e) => return CommandResult::SpawnFailed(format!("failed to spawn {program}: {e}")),
    };

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            CommandResult::Exited {
                success: output.status.success(),
                output: format!("{}\n{}", stdout, stderr),
            }
        }
        Ok(Err(e)) => CommandResult::SpawnFailed(format!("{program} execution error: {e}")),
        Err(_) => {
            tracing::debug!("{} timed out after {:?}", program, timeout);
            CommandResult::TimedOut
        }
    }
}

fn log_output(suite: &GeneratedSuite, output: &str) {
    tracing::debug!(
        "{} output:\n{}",
        suite.suite_id,
        truncate_output(output, MAX_OUTPUT_BYTES)
    );
}

fn truncate_output(output: &str, max_bytes: usize) -> String {
    if output.len() <= max_bytes {
        return output.to_string();
    }
    let mut end = max_bytes;
    while !output.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...(truncated)", &output[..end])
}

fn last_count(output: &str, re: &Regex) -> usize {
    re.captures_iter(output)
        .last()
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<usize>().ok())
        .unwrap_or(0)
}

/// Counts from pytest's closing line. Collection errors count as failures.
fn parse_pytest_counts(output: &str) -> (usize, usize) {
    let passed = last_count(output, scan::cached(&PYTEST_PASSED, r"(\d+)\s+passed"));
    let failed = last_count(output, scan::cached(&PYTEST_FAILED, r"(\d+)\s+failed"));
    let errors = last_count(output, scan::cached(&PYTEST_ERRORS, r"(\d+)\s+errors?\b"));
    (passed, failed + errors)
}

/// Counts from libtest's `test result:` line.
fn parse_cargo_counts(output: &str) -> (usize, usize) {
    let re = scan::cached(
        &CARGO_RESULT,
        r"test result:\s+\w+\.\s+(\d+) passed;\s+(\d+) failed;",
    );
    match re.captures_iter(output).last() {
        Some(c) => {
            let p = c.get(1).and_then(|m| m.as_str().parse::<usize>().ok()).unwrap_or(0);
            let f = c.get(2).and_then(|m| m.as_str().parse::<usize>().ok()).unwrap_or(0);
            (p, f)
        }
        None => (0, 0),
    }
}

/// Counts from the TAP summary that `node --test` prints.
fn parse_tap_counts(output: &str) -> (usize, usize) {
    let passed = last_count(output, scan::cached(&TAP_PASS, r"(?m)^# pass (\d+)"));
    let failed = last_count(output, scan::cached(&TAP_FAIL, r"(?m)^# fail (\d+)"));
    (passed, failed)
}
