//! Multi-language test generation and execution.
//!
//! A run walks a repository, classifies and analyzes every source file,
//! generates unit and integration tests for the languages that have a
//! generator, executes them in isolated child processes with bounded
//! parallelism, and folds the outcomes into one [`aggregate::RunSummary`].

pub mod aggregate;
pub mod analysis;
pub mod config;
pub mod error;
pub mod generate;
pub mod language;
pub mod orchestrator;
pub mod registry;
pub mod repo_config;
pub mod report;
pub mod repository;
pub mod runner;
pub mod store;

pub use aggregate::RunSummary;
pub use config::Config;
pub use error::OrchestratorError;
pub use orchestrator::{Orchestrator, RunHandle};
