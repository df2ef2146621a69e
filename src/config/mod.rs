use crate::error::OrchestratorError;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration. Read once at run start and never mutated
/// while a run is in progress.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Test generation and execution settings
    #[serde(default)]
    pub run: RunConfig,

    /// Toolchain commands used to execute generated suites
    #[serde(default)]
    pub runners: RunnerCommands,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Pass ratio (percent) a run must reach to count as on target
    #[serde(default = "default_target_coverage")]
    pub target_coverage: u8,

    /// Preferred test framework, or "auto" to pick per language
    #[serde(default = "default_test_framework")]
    pub test_framework: String,

    /// Where generated suites and reports are written
    #[serde(default = "default_test_directory")]
    pub test_directory: PathBuf,

    /// Report format hint, passed through to the report sink
    #[serde(default = "default_output_format")]
    pub output_format: String,

    /// Run suites concurrently
    #[serde(default = "default_parallel_execution")]
    pub parallel_execution: bool,

    /// Worker pool size when running in parallel
    #[serde(default = "default_max_parallelism")]
    pub max_parallelism: usize,

    /// Timeout for a single suite execution (in seconds)
    #[serde(default = "default_per_test_timeout")]
    pub per_test_timeout_seconds: i64,

    /// Keep a copy of every valid generated suite under `test_directory`
    #[serde(default = "default_persist_suites")]
    pub persist_suites: bool,
}

/// Executables used by the process runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerCommands {
    #[serde(default = "default_python")]
    pub python: String,

    #[serde(default = "default_rustc")]
    pub rustc: String,

    #[serde(default = "default_node")]
    pub node: String,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_target_coverage() -> u8 {
    100
}

fn default_test_framework() -> String {
    "auto".to_string()
}

fn default_test_directory() -> PathBuf {
    PathBuf::from("testotron_tests")
}

fn default_output_format() -> String {
    "json".to_string()
}

fn default_parallel_execution() -> bool {
    true
}

fn default_max_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn default_per_test_timeout() -> i64 {
    30
}

fn default_persist_suites() -> bool {
    true
}

fn default_python() -> String {
    "python3".to_string()
}

fn default_rustc() -> String {
    "rustc".to_string()
}

fn default_node() -> String {
    "node".to_string()
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            target_coverage: default_target_coverage(),
            test_framework: default_test_framework(),
            test_directory: default_test_directory(),
            output_format: default_output_format(),
            parallel_execution: default_parallel_execution(),
            max_parallelism: default_max_parallelism(),
            per_test_timeout_seconds: default_per_test_timeout(),
            persist_suites: default_persist_suites(),
        }
    }
}

impl Default for RunnerCommands {
    fn default() -> Self {
        Self {
            python: default_python(),
            rustc: default_rustc(),
            node: default_node(),
        }
    }
}

impl RunConfig {
    /// A run config is usable iff the timeout is positive and a test
    /// directory is named.
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    pub fn validate(&self) -> Result<(), OrchestratorError> {
        if self.per_test_timeout_seconds <= 0 {
            return Err(OrchestratorError::ConfigInvalid {
                reason: format!(
                    "per_test_timeout_seconds must be positive (got {})",
                    self.per_test_timeout_seconds
                ),
            });
        }
        if self.test_directory.as_os_str().is_empty() {
            return Err(OrchestratorError::ConfigInvalid {
                reason: "test_directory must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Number of concurrent suite executions. Zero is treated as one.
    pub fn worker_count(&self) -> usize {
        if self.parallel_execution {
            self.max_parallelism.max(1)
        } else {
            1
        }
    }

    pub fn per_test_timeout(&self) -> Duration {
        Duration::from_secs(u64::try_from(self.per_test_timeout_seconds).unwrap_or(0))
    }
}

impl Config {
    /// Load configuration from file, or use defaults if not found
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path.map(PathBuf::from).or_else(Self::default_config_path);

        let config = if let Some(ref path) = config_path {
            if path.exists() {
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config from {:?}", path))?;
                toml::from_str(&contents)
                    .with_context(|| format!("Failed to parse config from {:?}", path))?
            } else {
                Config::default()
            }
        } else {
            Config::default()
        };

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let config_path = path
            .map(PathBuf::from)
            .or_else(Self::default_config_path)
            .context("No config path available")?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, contents)
            .with_context(|| format!("Failed to write config to {:?}", config_path))?;

        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "testotron", "testotron")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    pub fn validate(&self) -> Result<(), OrchestratorError> {
        self.run.validate()
    }

    /// Path of the report written by the JSON report sink.
    pub fn report_path(&self) -> PathBuf {
        self.run.test_directory.join("report.json")
    }
}
