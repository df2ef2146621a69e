//! The run pipeline.
//!
//! Each discovered file moves through classify, analyze and generate inline.
//! Valid suites are queued to a bounded pool of workers that call the
//! [`TestRunner`]; outcomes come back over a channel and are folded into the
//! [`RunSummary`] by the orchestrator alone.

mod state;

pub use state::FileState;

use crate::aggregate::{FileUpdate, RunSummary, Stage};
use crate::config::Config;
use crate::error::OrchestratorError;
use crate::generate::GeneratedSuite;
use crate::language::LanguageTag;
use crate::registry::BackendRegistry;
use crate::repository::{RepositoryProvider, SourceFile};
use crate::runner::{TestOutcome, TestRunner};
use crate::store::SuiteStore;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::sync::Mutex as TokioMutex;

/// Extra time a runner gets past the per-test timeout before its outcome is
/// forced to a timeout.
pub const RUNNER_GRACE: Duration = Duration::from_secs(2);

pub const CANCELLED_REASON: &str = "run cancelled";
pub const UNKNOWN_LANGUAGE_REASON: &str = "unknown language";

/// State change of one file, sent on the optional progress channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub index: usize,
    pub path: String,
    pub state: FileState,
}

/// Cloneable handle for cancelling a run from another task.
///
/// Cancellation is sticky: once set, later runs on the same orchestrator are
/// cancelled too.
#[derive(Clone)]
pub struct RunHandle {
    cancelled: Arc<AtomicBool>,
}

impl RunHandle {
    /// Stop dispatching. Suites already running finish or time out.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

struct Job {
    index: usize,
    suite: GeneratedSuite,
}

struct JobResult {
    index: usize,
    /// `None` when the job was dropped because the run was cancelled.
    outcome: Option<TestOutcome>,
}

/// Result of the inline stages for one file.
enum Prepared {
    Done(FileUpdate),
    Ready(GeneratedSuite),
}

/// Per-file state, owned by the orchestrator.
struct Tracker {
    states: Vec<FileState>,
    paths: Vec<String>,
    progress: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl Tracker {
    fn new(files: &[SourceFile], progress: Option<mpsc::UnboundedSender<ProgressEvent>>) -> Self {
        Self {
            states: vec![FileState::Discovered; files.len()],
            paths: files.iter().map(|f| f.relative_path.clone()).collect(),
            progress,
        }
    }

    fn advance(&mut self, index: usize, next: FileState) {
        let current = self.states[index];
        if !current.can_transition_to(next) {
            tracing::warn!(
                "Ignoring illegal transition {} -> {} for {}",
                current,
                next,
                self.paths[index]
            );
            return;
        }
        self.states[index] = next;
        tracing::debug!("{}: {}", self.paths[index], next);

        if let Some(progress) = &self.progress {
            // A dropped receiver only means nobody is watching
            let _ = progress.send(ProgressEvent {
                index,
                path: self.paths[index].clone(),
                state: next,
            });
        }
    }

    fn unfinished(&self) -> Vec<usize> {
        (0..self.states.len())
            .filter(|&i| !self.states[i].is_terminal())
            .collect()
    }
}

pub struct Orchestrator<R: TestRunner> {
    config: Config,
    registry: BackendRegistry,
    runner: Arc<R>,
    cancelled: Arc<AtomicBool>,
    progress: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl<R: TestRunner> Orchestrator<R> {
    pub fn new(config: Config, registry: BackendRegistry, runner: R) -> Self {
        Self {
            config,
            registry,
            runner: Arc::new(runner),
            cancelled: Arc::new(AtomicBool::new(false)),
            progress: None,
        }
    }

    /// Report every file state change on `progress`.
    pub fn with_progress(mut self, progress: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn handle(&self) -> RunHandle {
        RunHandle {
            cancelled: Arc::clone(&self.cancelled),
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Process every file the provider yields and return the folded summary.
    ///
    /// Fails only when the configuration is invalid or the repository cannot
    /// be enumerated; every per-file problem ends up in the summary.
    pub async fn run(&self, provider: &dyn RepositoryProvider) -> Result<RunSummary, OrchestratorError> {
        let start = Instant::now();
        self.config.validate()?;

        let files = provider
            .files()
            .map_err(|e| OrchestratorError::RepositoryUnavailable {
                path: e.path().to_path_buf(),
                reason: e.to_string(),
            })?;

        // Never more workers than files
        let workers = self.config.run.worker_count().min(files.len().max(1));
        let timeout = self.config.run.per_test_timeout();
        tracing::debug!("Registered backends: {:?}", self.registry.languages());
        tracing::info!(
            "Processing {} files from {} ({} workers, {:?} per suite)",
            files.len(),
            provider.handle().root.display(),
            workers,
            timeout
        );

        let store = self
            .config
            .run
            .persist_suites
            .then(|| SuiteStore::new(&self.config.run.test_directory, chrono::Local::now()));

        let mut tracker = Tracker::new(&files, self.progress.clone());
        let mut summary = RunSummary::new();
        // Queued files awaiting an outcome: index -> language
        let mut pending: BTreeMap<usize, LanguageTag> = BTreeMap::new();

        let (job_tx, job_rx) = mpsc::channel::<Job>(workers.saturating_mul(2));
        let job_rx = Arc::new(TokioMutex::new(job_rx));
        let (result_tx, mut result_rx) = mpsc::unbounded_channel::<JobResult>();

        let mut worker_handles = Vec::with_capacity(workers);
        for id in 0..workers {
            let runner = Arc::clone(&self.runner);
            let receiver = Arc::clone(&job_rx);
            let results = result_tx.clone();
            let cancelled = Arc::clone(&self.cancelled);
            worker_handles.push(tokio::spawn(async move {
                suite_worker(id, runner, receiver, results, cancelled, timeout).await
            }));
        }
        drop(result_tx);

        for (index, file) in files.iter().enumerate() {
            while let Ok(result) = result_rx.try_recv() {
                summary = fold_result(summary, &mut tracker, &mut pending, result);
            }

            if self.is_cancelled() {
                summary = finish(
                    summary,
                    &mut tracker,
                    FileUpdate::skipped(index, &file.relative_path, file.language, CANCELLED_REASON),
                );
                continue;
            }

            let suite = match self.prepare(index, file, &mut tracker) {
                Prepared::Done(update) => {
                    summary = finish(summary, &mut tracker, update);
                    continue;
                }
                Prepared::Ready(suite) => suite,
            };

            if let Some(store) = &store {
                if let Err(e) = store.write(&suite).await {
                    tracing::warn!("Failed to store suite for {}: {:#}", file.relative_path, e);
                }
            }

            tracker.advance(index, FileState::Queued);
            pending.insert(index, file.language);
            if job_tx.send(Job { index, suite }).await.is_err() {
                // Every worker is gone; the leftover pass below records it
                tracing::warn!("Worker pool closed before {} was queued", file.relative_path);
                break;
            }
        }
        drop(job_tx);

        while let Some(result) = result_rx.recv().await {
            summary = fold_result(summary, &mut tracker, &mut pending, result);
        }

        for handle in worker_handles {
            if let Err(e) = handle.await {
                tracing::warn!("Suite worker failed: {}", e);
            }
        }

        // Anything still open was queued to a worker that died, or never
        // reached the queue.
        for index in tracker.unfinished() {
            let file = &files[index];
            let update = if pending.remove(&index).is_some() {
                tracker.advance(index, FileState::Executed);
                FileUpdate::failed(
                    index,
                    &file.relative_path,
                    file.language,
                    Stage::Run,
                    "runner fault: worker stopped before reporting",
                )
            } else {
                let reason = if self.is_cancelled() {
                    CANCELLED_REASON
                } else {
                    "not dispatched: worker pool closed"
                };
                FileUpdate::skipped(index, &file.relative_path, file.language, reason)
            };
            summary = finish(summary, &mut tracker, update);
        }

        summary.cancelled = self.is_cancelled();
        summary.duration_ms = start.elapsed().as_millis() as u64;

        tracing::info!(
            "Run finished: {} files, {} passed, {} failed, {} skipped, {} errors ({}ms){}",
            summary.total_files,
            summary.total_passed,
            summary.total_failed,
            summary.files_skipped,
            summary.errors.len(),
            summary.duration_ms,
            if summary.cancelled { " [cancelled]" } else { "" }
        );

        Ok(summary)
    }

    /// Classify, analyze and generate one file.
    fn prepare(&self, index: usize, file: &SourceFile, tracker: &mut Tracker) -> Prepared {
        let path = &file.relative_path;
        let language = file.language;
        tracker.advance(index, FileState::Classified);

        if !language.is_known() {
            return Prepared::Done(FileUpdate::skipped(index, path, language, UNKNOWN_LANGUAGE_REASON));
        }

        let Some(backend) = self.registry.get(language) else {
            return Prepared::Done(FileUpdate::skipped(
                index,
                path,
                language,
                format!("no analyzer for {language}"),
            ));
        };

        let analysis = match backend.analyzer.analyze(file) {
            Ok(analysis) => analysis,
            Err(e) => {
                tracing::warn!("Analysis failed for {}: {}", path, e);
                return Prepared::Done(FileUpdate::failed(
                    index,
                    path,
                    language,
                    Stage::Analyze,
                    e.to_string(),
                ));
            }
        };
        tracker.advance(index, FileState::Analyzed);
        tracing::debug!(
            "{}: {} functions, {} classes, complexity {}",
            path,
            analysis.functions.len(),
            analysis.classes.len(),
            analysis.complexity
        );

        let Some(generator) = &backend.generator else {
            return Prepared::Done(FileUpdate::skipped(
                index,
                path,
                language,
                format!("no test generator for {language}"),
            ));
        };

        let wanted = &self.config.run.test_framework;
        if wanted != "auto" && !wanted.eq_ignore_ascii_case(generator.framework()) {
            return Prepared::Done(FileUpdate::skipped(
                index,
                path,
                language,
                format!("no {wanted} generator for {language}"),
            ));
        }

        let suite = generator.generate(file, &analysis);
        tracker.advance(index, FileState::Generated);

        if !suite.syntax_valid {
            tracing::warn!("Generated {} suite for {} failed syntax validation", suite.framework, path);
            let message = format!("generated {} suite failed syntax validation", suite.framework);
            return Prepared::Done(
                FileUpdate::skipped(index, path, language, message.clone())
                    .with_error(Stage::Generate, message),
            );
        }

        Prepared::Ready(suite)
    }
}

/// Advance a file to its terminal state and fold it.
fn finish(summary: RunSummary, tracker: &mut Tracker, update: FileUpdate) -> RunSummary {
    tracker.advance(update.index, update.state);
    summary.fold(update)
}

fn fold_result(
    summary: RunSummary,
    tracker: &mut Tracker,
    pending: &mut BTreeMap<usize, LanguageTag>,
    result: JobResult,
) -> RunSummary {
    let Some(language) = pending.remove(&result.index) else {
        tracing::warn!("Dropping duplicate result for file {}", result.index);
        return summary;
    };
    let path = tracker.paths[result.index].clone();

    let update = match result.outcome {
        Some(outcome) => {
            tracker.advance(result.index, FileState::Executed);
            if outcome.is_timeout() {
                tracing::warn!("Suite for {} timed out after {}ms", path, outcome.duration_ms);
            } else if let Some(error) = &outcome.error {
                tracing::warn!("Suite for {} did not complete cleanly: {}", path, error);
            }
            FileUpdate::executed(result.index, path, language, outcome)
        }
        None => FileUpdate::skipped(result.index, path, language, CANCELLED_REASON),
    };
    finish(summary, tracker, update)
}

/// Pull jobs until the queue closes. Jobs received after cancellation are
/// returned unrun.
async fn suite_worker<R: TestRunner>(
    id: usize,
    runner: Arc<R>,
    receiver: Arc<TokioMutex<mpsc::Receiver<Job>>>,
    results: mpsc::UnboundedSender<JobResult>,
    cancelled: Arc<AtomicBool>,
    timeout: Duration,
) {
    loop {
        let job = {
            let mut rx = receiver.lock().await;
            rx.recv().await
        };
        let Some(job) = job else {
            tracing::debug!("Suite worker {} finished - no more jobs", id);
            break;
        };

        if cancelled.load(Ordering::SeqCst) {
            let _ = results.send(JobResult {
                index: job.index,
                outcome: None,
            });
            continue;
        }

        let outcome = execute(Arc::clone(&runner), job.suite, timeout).await;
        if results
            .send(JobResult {
                index: job.index,
                outcome: Some(outcome),
            })
            .is_err()
        {
            break;
        }
    }
}

/// Run one suite on its own task, bounded by `timeout` plus grace.
async fn execute<R: TestRunner>(runner: Arc<R>, suite: GeneratedSuite, timeout: Duration) -> TestOutcome {
    let start = Instant::now();
    let task_suite = suite.clone();

    let mut task = tokio::spawn(async move { runner.run(task_suite, timeout).await });

    match tokio::time::timeout(timeout + RUNNER_GRACE, &mut task).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => TestOutcome::fault(&suite, e, start.elapsed().as_millis() as u64),
        Err(_) => {
            task.abort();
            tracing::warn!("Runner for {} overran its timeout, abandoning it", suite.suite_id);
            TestOutcome::timeout(&suite, start.elapsed().as_millis() as u64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{AnalysisResult, CodeAnalyzer, PythonAnalyzer, DEFAULT_MAX_FILE_BYTES};
    use crate::error::AnalysisError;
    use crate::generate::{RenderedTests, TestGenerator};
    use crate::repository::{InMemoryRepository, LocalRepository, RepositoryHandle};
    use crate::runner::TIMEOUT_ERROR;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Clone, Copy)]
    enum Behavior {
        Pass,
        FailOne,
        Sleep(Duration),
        Hang,
        Panic,
    }

    /// Runner that records what it ran instead of spawning toolchains.
    struct FakeRunner {
        behavior: Behavior,
        runs: Mutex<Vec<String>>,
        active: AtomicUsize,
        max_active: AtomicUsize,
        cancel_on_run: Option<RunHandle>,
    }

    impl FakeRunner {
        fn new(behavior: Behavior) -> Self {
            Self {
                behavior,
                runs: Mutex::new(Vec::new()),
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
                cancel_on_run: None,
            }
        }
    }

    impl TestRunner for FakeRunner {
        async fn run(&self, suite: GeneratedSuite, _timeout: Duration) -> TestOutcome {
            self.runs.lock().unwrap().push(suite.relative_path.clone());
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            if let Some(handle) = &self.cancel_on_run {
                handle.cancel();
            }

            let outcome = match self.behavior {
                Behavior::Pass => TestOutcome::new(&suite.suite_id, suite.declared_tests, 0, 1),
                Behavior::FailOne => TestOutcome::new(&suite.suite_id, suite.declared_tests - 1, 1, 1),
                Behavior::Sleep(d) => {
                    tokio::time::sleep(d).await;
                    TestOutcome::new(&suite.suite_id, suite.declared_tests, 0, d.as_millis() as u64)
                }
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    TestOutcome::new(&suite.suite_id, 0, 0, 0)
                }
                Behavior::Panic => panic!("runner exploded"),
            };

            self.active.fetch_sub(1, Ordering::SeqCst);
            outcome
        }
    }

    /// Generator whose output never validates.
    struct BrokenGenerator;

    impl TestGenerator for BrokenGenerator {
        fn framework(&self) -> &'static str {
            "broken"
        }

        fn render(&self, _file: &SourceFile, _analysis: &AnalysisResult) -> RenderedTests {
            RenderedTests {
                unit_file: "broken.rs".to_string(),
                unit_test_code: "#[test] fn a() {".to_string(),
                integration_file: "broken_it.rs".to_string(),
                integration_test_code: String::new(),
                declared_tests: 1,
            }
        }

        fn validate_syntax(&self, _code: &str) -> bool {
            false
        }
    }

    /// Analyzer that counts calls.
    #[derive(Default)]
    struct CountingAnalyzer {
        calls: Arc<AtomicUsize>,
    }

    impl CodeAnalyzer for CountingAnalyzer {
        fn analyze(&self, _file: &SourceFile) -> Result<AnalysisResult, AnalysisError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(AnalysisResult::empty())
        }
    }

    /// Provider that fails the test if it is ever consulted.
    struct UntouchableRepository {
        handle: RepositoryHandle,
    }

    impl RepositoryProvider for UntouchableRepository {
        fn handle(&self) -> &RepositoryHandle {
            &self.handle
        }

        fn files(&self) -> Result<Vec<SourceFile>, crate::error::RepositoryError> {
            panic!("files() must not be called for an invalid config");
        }
    }

    fn config(dir: &std::path::Path, parallelism: usize) -> Config {
        let mut config = Config::default();
        config.run.test_directory = dir.to_path_buf();
        config.run.max_parallelism = parallelism;
        config.run.per_test_timeout_seconds = 30;
        config.run.persist_suites = false;
        config
    }

    fn registry() -> BackendRegistry {
        BackendRegistry::with_defaults(DEFAULT_MAX_FILE_BYTES)
    }

    fn python_repo(count: usize) -> InMemoryRepository {
        (0..count).fold(InMemoryRepository::new("/repo"), |repo, i| {
            repo.with_file(&format!("mod_{i:02}.py"), format!("def f{i}():\n    return {i}\n"))
        })
    }

    // =========================================================================
    // pre-run failure tests
    // =========================================================================

    #[tokio::test]
    async fn test_invalid_config_touches_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = config(temp_dir.path(), 2);
        config.run.per_test_timeout_seconds = -1;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let orchestrator =
            Orchestrator::new(config, registry(), FakeRunner::new(Behavior::Pass)).with_progress(tx);
        let provider = UntouchableRepository {
            handle: RepositoryHandle::local("/repo"),
        };

        let result = orchestrator.run(&provider).await;

        assert!(matches!(result, Err(OrchestratorError::ConfigInvalid { .. })));
        assert!(orchestrator.runner.runs.lock().unwrap().is_empty());
        drop(orchestrator);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_missing_repository_is_unavailable() {
        let temp_dir = TempDir::new().unwrap();
        let orchestrator = Orchestrator::new(
            config(temp_dir.path(), 2),
            registry(),
            FakeRunner::new(Behavior::Pass),
        );
        let provider = LocalRepository::new(RepositoryHandle::local(temp_dir.path().join("missing")));

        let result = orchestrator.run(&provider).await;

        match result {
            Err(OrchestratorError::RepositoryUnavailable { path, .. }) => {
                assert!(path.ends_with("missing"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    // =========================================================================
    // per-file outcome tests
    // =========================================================================

    #[tokio::test]
    async fn test_three_file_scenario() {
        let temp_dir = TempDir::new().unwrap();
        let mut registry = registry();
        registry.register(
            LanguageTag::Rust,
            Arc::new(crate::analysis::RustAnalyzer::default()),
            Some(Arc::new(BrokenGenerator)),
        );

        let orchestrator = Orchestrator::new(
            config(temp_dir.path(), 2),
            registry,
            FakeRunner::new(Behavior::Pass),
        );
        let repo = InMemoryRepository::new("/repo")
            .with_file("a_ok.py", "def add(a, b):\n    return a + b\n")
            .with_file("b_notes.xyz", "whatever")
            .with_file("c_broken.rs", "pub fn f() {}\n");

        let summary = orchestrator.run(&repo).await.unwrap();

        assert_eq!(summary.total_files, 3);
        assert_eq!(summary.files_skipped, 2);
        assert_eq!(summary.files_failed, 0);
        assert!(summary.total_passed >= 1);
        assert_eq!(summary.total_failed, 0);
        assert_eq!(summary.errors.len(), 1);
        assert_eq!(summary.errors[0].file, "c_broken.rs");
        assert_eq!(summary.errors[0].stage, Stage::Generate);
        assert!(!summary.cancelled);

        let states: Vec<FileState> = summary.files.iter().map(|f| f.state).collect();
        assert_eq!(states, vec![FileState::Folded, FileState::Skipped, FileState::Skipped]);
        assert_eq!(
            summary.files[1].reason.as_deref(),
            Some(UNKNOWN_LANGUAGE_REASON)
        );
        assert_eq!(
            *orchestrator.runner.runs.lock().unwrap(),
            vec!["a_ok.py".to_string()]
        );
    }

    #[tokio::test]
    async fn test_unknown_language_never_reaches_backends() {
        let temp_dir = TempDir::new().unwrap();
        let analyzer = CountingAnalyzer::default();
        let calls = Arc::clone(&analyzer.calls);

        let mut registry = registry();
        registry.register(LanguageTag::Unknown, Arc::new(analyzer), None);

        let orchestrator = Orchestrator::new(
            config(temp_dir.path(), 1),
            registry,
            FakeRunner::new(Behavior::Pass),
        );
        let repo = InMemoryRepository::new("/repo")
            .with_file("README", "plain text")
            .with_file("data.csv", "a,b");

        let summary = orchestrator.run(&repo).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(orchestrator.runner.runs.lock().unwrap().is_empty());
        assert_eq!(summary.files_skipped, 2);
        assert!(summary.errors.is_empty());
    }

    #[tokio::test]
    async fn test_language_without_generator_is_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let orchestrator = Orchestrator::new(
            config(temp_dir.path(), 1),
            registry(),
            FakeRunner::new(Behavior::Pass),
        );
        let repo = InMemoryRepository::new("/repo").with_file("main.go", "package main\nfunc main() {}\n");

        let summary = orchestrator.run(&repo).await.unwrap();

        assert_eq!(summary.files_skipped, 1);
        assert!(summary.errors.is_empty());
        assert_eq!(summary.files[0].reason.as_deref(), Some("no test generator for Go"));
    }

    #[tokio::test]
    async fn test_pinned_framework_skips_other_languages() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = config(temp_dir.path(), 2);
        config.run.test_framework = "pytest".to_string();
        let orchestrator = Orchestrator::new(config, registry(), FakeRunner::new(Behavior::Pass));
        let repo = InMemoryRepository::new("/repo")
            .with_file("a.py", "def a():\n    pass\n")
            .with_file("b.js", "function b() {}\n");

        let summary = orchestrator.run(&repo).await.unwrap();

        assert_eq!(summary.files[0].state, FileState::Folded);
        assert_eq!(summary.files[1].state, FileState::Skipped);
        assert_eq!(
            summary.files[1].reason.as_deref(),
            Some("no pytest generator for JavaScript")
        );
        assert!(summary.errors.is_empty());
    }

    #[tokio::test]
    async fn test_analysis_error_fails_file_only() {
        let temp_dir = TempDir::new().unwrap();
        let orchestrator = Orchestrator::new(
            config(temp_dir.path(), 2),
            registry(),
            FakeRunner::new(Behavior::Pass),
        );
        let repo = InMemoryRepository::new("/repo")
            .with_file("bad.py", vec![0xff, 0xfe, 0x00])
            .with_file("good.py", "def ok():\n    pass\n");

        let summary = orchestrator.run(&repo).await.unwrap();

        assert_eq!(summary.files_failed, 1);
        assert_eq!(summary.errors.len(), 1);
        assert_eq!(summary.errors[0].file, "bad.py");
        assert_eq!(summary.errors[0].stage, Stage::Analyze);
        assert_eq!(summary.files[1].state, FileState::Folded);
        assert!(summary.total_passed > 0);
    }

    #[tokio::test]
    async fn test_failing_tests_are_counted_not_errors() {
        let temp_dir = TempDir::new().unwrap();
        let orchestrator = Orchestrator::new(
            config(temp_dir.path(), 2),
            registry(),
            FakeRunner::new(Behavior::FailOne),
        );

        let summary = orchestrator.run(&python_repo(2)).await.unwrap();

        assert_eq!(summary.total_failed, 2);
        assert!(summary.errors.is_empty());
        assert!(!summary.all_passed());
    }

    #[tokio::test]
    async fn test_runner_panic_is_fault() {
        let temp_dir = TempDir::new().unwrap();
        let orchestrator = Orchestrator::new(
            config(temp_dir.path(), 2),
            registry(),
            FakeRunner::new(Behavior::Panic),
        );

        let summary = orchestrator.run(&python_repo(2)).await.unwrap();

        assert_eq!(summary.total_files, 2);
        assert_eq!(summary.files_failed, 2);
        assert_eq!(summary.errors.len(), 2);
        assert!(summary
            .errors
            .iter()
            .all(|e| e.stage == Stage::Run && e.message.starts_with("runner fault")));
    }

    // =========================================================================
    // scheduling tests
    // =========================================================================

    #[tokio::test]
    async fn test_ten_files_four_workers() {
        let temp_dir = TempDir::new().unwrap();
        let orchestrator = Orchestrator::new(
            config(temp_dir.path(), 4),
            registry(),
            FakeRunner::new(Behavior::Sleep(Duration::from_millis(20))),
        );

        let summary = orchestrator.run(&python_repo(10)).await.unwrap();

        let runs = orchestrator.runner.runs.lock().unwrap().clone();
        let unique: HashSet<&String> = runs.iter().collect();
        assert_eq!(runs.len(), 10);
        assert_eq!(unique.len(), 10);
        assert!(orchestrator.runner.max_active.load(Ordering::SeqCst) <= 4);

        assert_eq!(summary.total_files, 10);
        assert!(summary.files.iter().all(|f| f.state == FileState::Folded));
        let indices: Vec<usize> = summary.files.iter().map(|f| f.index).collect();
        assert_eq!(indices, (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_huge_parallelism_is_bounded_by_file_count() {
        let temp_dir = TempDir::new().unwrap();

        for parallelism in [usize::MAX, 1 << 62] {
            let orchestrator = Orchestrator::new(
                config(temp_dir.path(), parallelism),
                registry(),
                FakeRunner::new(Behavior::Pass),
            );

            let summary = orchestrator.run(&python_repo(1)).await.unwrap();

            assert_eq!(summary.total_files, 1);
            assert_eq!(summary.files[0].state, FileState::Folded);
            assert!(summary.all_passed());
        }
    }

    #[tokio::test]
    async fn test_empty_repository_with_huge_parallelism() {
        let temp_dir = TempDir::new().unwrap();
        let orchestrator = Orchestrator::new(
            config(temp_dir.path(), usize::MAX),
            registry(),
            FakeRunner::new(Behavior::Pass),
        );

        let summary = orchestrator.run(&InMemoryRepository::new("/repo")).await.unwrap();

        assert_eq!(summary.total_files, 0);
        assert!(summary.errors.is_empty());
    }

    #[tokio::test]
    async fn test_sequential_execution_uses_one_worker() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = config(temp_dir.path(), 8);
        config.run.parallel_execution = false;
        let orchestrator = Orchestrator::new(
            config,
            registry(),
            FakeRunner::new(Behavior::Sleep(Duration::from_millis(5))),
        );

        let summary = orchestrator.run(&python_repo(5)).await.unwrap();

        assert_eq!(summary.total_files, 5);
        assert_eq!(orchestrator.runner.max_active.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_hanging_runner_is_bounded_by_timeout() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = config(temp_dir.path(), 2);
        config.run.per_test_timeout_seconds = 1;
        let orchestrator = Orchestrator::new(config, registry(), FakeRunner::new(Behavior::Hang));

        let start = Instant::now();
        let summary = orchestrator.run(&python_repo(2)).await.unwrap();

        assert!(start.elapsed() < Duration::from_secs(1) + RUNNER_GRACE + Duration::from_secs(2));
        assert_eq!(summary.files_failed, 2);
        assert!(summary.errors.iter().all(|e| e.message == TIMEOUT_ERROR));
        // Each python suite declares 3 tests: one unit, two integration
        assert_eq!(summary.total_failed, 6);
    }

    #[tokio::test]
    async fn test_error_order_is_discovery_order() {
        let temp_dir = TempDir::new().unwrap();
        let repo = (0..6).fold(InMemoryRepository::new("/repo"), |repo, i| {
            repo.with_file(&format!("f{i}.py"), vec![0xff, i as u8])
        });

        for parallelism in [1, 3, 6] {
            let orchestrator = Orchestrator::new(
                config(temp_dir.path(), parallelism),
                registry(),
                FakeRunner::new(Behavior::Pass),
            );
            let summary = orchestrator.run(&repo).await.unwrap();
            let files: Vec<&str> = summary.errors.iter().map(|e| e.file.as_str()).collect();
            assert_eq!(files, vec!["f0.py", "f1.py", "f2.py", "f3.py", "f4.py", "f5.py"]);
        }
    }

    // =========================================================================
    // cancellation tests
    // =========================================================================

    #[tokio::test]
    async fn test_cancel_skips_remaining_files() {
        let temp_dir = TempDir::new().unwrap();
        let mut runner = FakeRunner::new(Behavior::Sleep(Duration::from_millis(20)));
        let mut orchestrator = Orchestrator::new(config(temp_dir.path(), 1), registry(), FakeRunner::new(Behavior::Pass));
        runner.cancel_on_run = Some(orchestrator.handle());
        orchestrator.runner = Arc::new(runner);

        let summary = orchestrator.run(&python_repo(5)).await.unwrap();

        assert!(summary.cancelled);
        assert_eq!(orchestrator.runner.runs.lock().unwrap().len(), 1);
        assert_eq!(summary.total_files, 5);
        assert_eq!(summary.files[0].state, FileState::Folded);
        assert_eq!(summary.files_skipped, 4);
        assert!(summary.files[1..]
            .iter()
            .all(|f| f.reason.as_deref() == Some(CANCELLED_REASON)));
        assert!(summary.errors.is_empty());
        assert!(!summary.all_passed());
    }

    #[tokio::test]
    async fn test_cancel_before_run() {
        let temp_dir = TempDir::new().unwrap();
        let orchestrator = Orchestrator::new(
            config(temp_dir.path(), 2),
            registry(),
            FakeRunner::new(Behavior::Pass),
        );
        let handle = orchestrator.handle();
        handle.cancel();
        assert!(handle.is_cancelled());

        let summary = orchestrator.run(&python_repo(3)).await.unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.files_skipped, 3);
        assert!(orchestrator.runner.runs.lock().unwrap().is_empty());
    }

    // =========================================================================
    // side channel tests
    // =========================================================================

    #[tokio::test]
    async fn test_progress_events_follow_pipeline() {
        let temp_dir = TempDir::new().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let orchestrator = Orchestrator::new(
            config(temp_dir.path(), 2),
            registry(),
            FakeRunner::new(Behavior::Pass),
        )
        .with_progress(tx);

        orchestrator
            .run(&InMemoryRepository::new("/repo").with_file("a.py", "def a():\n    pass\n"))
            .await
            .unwrap();
        drop(orchestrator);

        let mut states = Vec::new();
        while let Some(event) = rx.recv().await {
            assert_eq!(event.path, "a.py");
            states.push(event.state);
        }
        assert_eq!(
            states,
            vec![
                FileState::Classified,
                FileState::Analyzed,
                FileState::Generated,
                FileState::Queued,
                FileState::Executed,
                FileState::Folded,
            ]
        );
    }

    #[tokio::test]
    async fn test_persisted_suites_written() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = config(temp_dir.path(), 1);
        config.run.persist_suites = true;
        let orchestrator = Orchestrator::new(config, registry(), FakeRunner::new(Behavior::Pass));

        orchestrator
            .run(&InMemoryRepository::new("/repo").with_file("pkg/util.py", "def a():\n    pass\n"))
            .await
            .unwrap();

        let written: Vec<_> = walkdir::WalkDir::new(temp_dir.path())
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.path().to_path_buf())
            .collect();
        assert_eq!(written.len(), 2);
        assert!(written
            .iter()
            .any(|p| p.ends_with("python/tests/pkg/util.py/test_util.py")));
    }

    #[tokio::test]
    async fn test_summary_is_reproducible() {
        let temp_dir = TempDir::new().unwrap();
        let repo = python_repo(4)
            .with_file("bad.py", vec![0xff])
            .with_file("notes.txt", "hi");

        let run = || async {
            let orchestrator = Orchestrator::new(
                config(temp_dir.path(), 3),
                registry(),
                FakeRunner::new(Behavior::Sleep(Duration::from_millis(3))),
            );
            let mut summary = orchestrator.run(&repo).await.unwrap();
            summary.duration_ms = 0;
            summary
        };

        let first = run().await;
        let second = run().await;
        assert_eq!(first.errors, second.errors);
        assert_eq!(first.files.len(), second.files.len());
        assert_eq!(first.total_passed, second.total_passed);
        assert_eq!(
            first.files.iter().map(|f| f.state).collect::<Vec<_>>(),
            second.files.iter().map(|f| f.state).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_python_analyzer_is_registered() {
        let registry = registry();
        let file = SourceFile::new("/r/a.py", "a.py", b"def a():\n    pass\n".to_vec());
        let result = registry
            .get(LanguageTag::Python)
            .unwrap()
            .analyzer
            .analyze(&file)
            .unwrap();
        assert_eq!(result, PythonAnalyzer::default().analyze(&file).unwrap());
    }
}
