//! Run-level result folding.
//!
//! [`RunSummary::fold`] is order-independent: totals are sums, and the error
//! and per-file lists are kept sorted by discovery index, so the summary does
//! not depend on which worker finished first.

use crate::language::LanguageTag;
use crate::orchestrator::FileState;
use crate::runner::TestOutcome;
use serde::{Deserialize, Serialize};

/// Pipeline stage an error is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Classify,
    Analyze,
    Generate,
    Run,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    /// Discovery index of the file.
    pub index: usize,
    pub file: String,
    pub stage: Stage,
    pub message: String,
}

/// Final state of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReport {
    pub index: usize,
    pub file: String,
    pub language: LanguageTag,
    pub state: FileState,
    pub passed: usize,
    pub failed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Everything learned about one file, ready to fold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpdate {
    pub index: usize,
    pub file: String,
    pub language: LanguageTag,
    pub state: FileState,
    pub outcome: Option<TestOutcome>,
    pub error: Option<(Stage, String)>,
    pub reason: Option<String>,
}

impl FileUpdate {
    /// A file that left the pipeline without running anything.
    pub fn skipped(index: usize, file: impl Into<String>, language: LanguageTag, reason: impl Into<String>) -> Self {
        Self {
            index,
            file: file.into(),
            language,
            state: FileState::Skipped,
            outcome: None,
            error: None,
            reason: Some(reason.into()),
        }
    }

    /// A file whose processing broke at `stage`.
    pub fn failed(
        index: usize,
        file: impl Into<String>,
        language: LanguageTag,
        stage: Stage,
        message: impl Into<String>,
    ) -> Self {
        let message = message.into();
        Self {
            index,
            file: file.into(),
            language,
            state: FileState::Failed,
            outcome: None,
            error: Some((stage, message.clone())),
            reason: Some(message),
        }
    }

    /// A file whose suite ran. Any runner error marks the file failed.
    pub fn executed(index: usize, file: impl Into<String>, language: LanguageTag, outcome: TestOutcome) -> Self {
        let state = if outcome.error.is_some() {
            FileState::Failed
        } else {
            FileState::Folded
        };
        Self {
            index,
            file: file.into(),
            language,
            state,
            error: outcome.error.clone().map(|e| (Stage::Run, e)),
            reason: outcome.error.clone(),
            outcome: Some(outcome),
        }
    }

    /// Record an error entry alongside the update without changing its state.
    pub fn with_error(mut self, stage: Stage, message: impl Into<String>) -> Self {
        self.error = Some((stage, message.into()));
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total_passed: usize,
    pub total_failed: usize,
    pub total_files: usize,
    pub files_skipped: usize,
    pub files_failed: usize,
    /// Pass ratio in `[0, 1]`, `0.0` when nothing ran.
    pub coverage_estimate: f64,
    pub errors: Vec<ErrorEntry>,
    pub files: Vec<FileReport>,
    pub cancelled: bool,
    pub duration_ms: u64,
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one file's result into the summary.
    pub fn fold(mut self, update: FileUpdate) -> Self {
        self.total_files += 1;
        match update.state {
            FileState::Skipped => self.files_skipped += 1,
            FileState::Failed => self.files_failed += 1,
            _ => {}
        }

        let (passed, failed) = update
            .outcome
            .as_ref()
            .map_or((0, 0), |o| (o.passed, o.failed));
        self.total_passed += passed;
        self.total_failed += failed;

        if let Some((stage, message)) = update.error {
            self.insert_error(ErrorEntry {
                index: update.index,
                file: update.file.clone(),
                stage,
                message,
            });
        }

        let report = FileReport {
            index: update.index,
            file: update.file,
            language: update.language,
            state: update.state,
            passed,
            failed,
            reason: update.reason,
        };
        let pos = self.files.partition_point(|f| f.index < report.index);
        self.files.insert(pos, report);

        self.coverage_estimate = coverage(self.total_passed, self.total_failed);
        self
    }

    fn insert_error(&mut self, entry: ErrorEntry) {
        let key = (entry.index, entry.stage);
        let pos = self.errors.partition_point(|e| (e.index, e.stage) <= key);
        self.errors.insert(pos, entry);
    }

    /// True when every test passed and no file errored.
    pub fn all_passed(&self) -> bool {
        !self.cancelled && self.total_failed == 0 && self.errors.is_empty()
    }

    /// Whether the pass ratio reaches `target` percent.
    pub fn meets_target(&self, target: u8) -> bool {
        self.coverage_estimate * 100.0 >= f64::from(target)
    }

    pub fn tests_run(&self) -> usize {
        self.total_passed + self.total_failed
    }
}

fn coverage(passed: usize, failed: usize) -> f64 {
    let total = passed + failed;
    if total == 0 {
        0.0
    } else {
        passed as f64 / total as f64
    }
}
