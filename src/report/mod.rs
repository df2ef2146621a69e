//! Report sinks. A sink receives the finished [`RunSummary`] once per run.

use crate::aggregate::RunSummary;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

pub trait ReportSink {
    /// Publish `summary`. `format` is the configured output format, passed
    /// through as a hint.
    fn publish(&self, summary: &RunSummary, format: &str) -> Result<()>;
}

/// Writes the summary as pretty-printed JSON.
pub struct JsonReportSink {
    path: PathBuf,
}

impl JsonReportSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ReportSink for JsonReportSink {
    fn publish(&self, summary: &RunSummary, format: &str) -> Result<()> {
        if !format.eq_ignore_ascii_case("json") {
            tracing::warn!("Output format '{}' is not supported, writing JSON", format);
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create report directory: {:?}", parent))?;
        }

        let contents = serde_json::to_string_pretty(summary).context("Failed to serialize run summary")?;
        std::fs::write(&self.path, contents)
            .with_context(|| format!("Failed to write report to {:?}", self.path))?;

        tracing::info!("Report written to {}", self.path.display());
        Ok(())
    }
}
