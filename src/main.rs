use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use testotron::analysis::DEFAULT_MAX_FILE_BYTES;
use testotron::registry::BackendRegistry;
use testotron::repo_config::RepoConfig;
use testotron::report::{JsonReportSink, ReportSink};
use testotron::repository::{LocalRepository, RepositoryHandle};
use testotron::runner::ProcessRunner;
use testotron::{Config, Orchestrator};

#[derive(Parser)]
#[command(name = "testotron")]
#[command(version)]
#[command(about = "Generate and run tests for every source file in a repository")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a repository, generate tests for it and run them
    Run {
        /// Repository root
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Remote the repository was checked out from, recorded in logs
        #[arg(long)]
        origin: Option<String>,

        /// Maximum number of suites executing at once
        #[arg(short = 'j', long)]
        parallelism: Option<usize>,

        /// Execute one suite at a time
        #[arg(long)]
        sequential: bool,

        /// Per-suite timeout in seconds
        #[arg(short, long)]
        timeout: Option<i64>,

        /// Directory for generated suites and the report
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Don't keep generated suites on disk
        #[arg(long)]
        no_persist: bool,
    },
    /// Write a default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Check that the configuration file loads and is valid
    ValidateConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().or_else(Config::default_config_path);
    let config = Config::load(cli.config.as_deref())?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .ok()
        .or_else(|| EnvFilter::try_new(&config.general.log_level).ok())
        .unwrap_or_else(|| EnvFilter::new("info"));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    tracing::debug!(
        "Config path: {}",
        config_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none, using defaults)".to_string())
    );

    match cli.command {
        Commands::Run {
            path,
            origin,
            parallelism,
            sequential,
            timeout,
            output_dir,
            no_persist,
        } => {
            let mut config = config;
            if let Some(parallelism) = parallelism {
                config.run.max_parallelism = parallelism;
            }
            if sequential {
                config.run.parallel_execution = false;
            }
            if let Some(timeout) = timeout {
                config.run.per_test_timeout_seconds = timeout;
            }
            if let Some(output_dir) = output_dir {
                config.run.test_directory = output_dir;
            }
            if no_persist {
                config.run.persist_suites = false;
            }
            run(config, &path, origin).await
        }
        Commands::InitConfig { force } => {
            let path = config_path.context("No config path available")?;
            if path.exists() && !force {
                anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
            }
            Config::default().save(Some(&path))?;
            tracing::info!("Wrote default configuration to {}", path.display());
            Ok(ExitCode::SUCCESS)
        }
        Commands::ValidateConfig => {
            config.validate()?;
            tracing::info!("Configuration is valid");
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run(mut config: Config, path: &Path, origin: Option<String>) -> anyhow::Result<ExitCode> {
    let root = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

    // A relative output directory lives inside the repository
    if config.run.test_directory.is_relative() && !config.run.test_directory.as_os_str().is_empty() {
        config.run.test_directory = root.join(&config.run.test_directory);
    }

    let mut handle = RepositoryHandle::local(&root);
    if let Some(origin) = origin {
        handle = handle.with_origin(origin);
    }
    let repo = LocalRepository::new(handle).exclude_dir(&config.run.test_directory);

    let max_file_bytes = RepoConfig::load(&root)
        .map(|c| c.max_file_bytes)
        .unwrap_or(DEFAULT_MAX_FILE_BYTES);
    let registry = BackendRegistry::with_defaults(max_file_bytes);
    let runner = ProcessRunner::new(config.runners.clone());

    let report_path = config.report_path();
    let output_format = config.run.output_format.clone();
    let target = config.run.target_coverage;

    let orchestrator = Orchestrator::new(config, registry, runner);

    let run_handle = orchestrator.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, finishing running suites");
            run_handle.cancel();
        }
    });

    let summary = orchestrator.run(&repo).await?;

    JsonReportSink::new(report_path).publish(&summary, &output_format)?;

    for error in &summary.errors {
        tracing::warn!("{} [{:?}]: {}", error.file, error.stage, error.message);
    }
    tracing::info!(
        "{} of {} tests passed ({} failed) across {} files ({} skipped); pass ratio {:.1}%",
        summary.total_passed,
        summary.tests_run(),
        summary.total_failed,
        summary.total_files,
        summary.files_skipped,
        summary.coverage_estimate * 100.0
    );
    if !summary.meets_target(target) {
        tracing::warn!("Pass ratio is below the {}% target", target);
    }

    Ok(if summary.all_passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
