//! Error types for the orchestration core.
//!
//! Only [`OrchestratorError`] ever aborts a run. Everything that goes wrong
//! for a single file is captured as data and folded into the run summary.

use std::path::PathBuf;
use thiserror::Error;

/// Fatal, pre-run failures. No file is processed when one of these occurs.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Invalid configuration: {reason}")]
    ConfigInvalid { reason: String },

    #[error("Repository unavailable at {}: {reason}", path.display())]
    RepositoryUnavailable { path: PathBuf, reason: String },
}

/// Failure to extract structural facts from a source file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    #[error("content is not valid UTF-8 (first invalid byte at offset {offset})")]
    Decode { offset: usize },

    #[error("file is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },
}

/// Failure reported by a repository provider.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("path does not exist: {}", path.display())]
    Missing { path: PathBuf },

    #[error("path is not a directory: {}", path.display())]
    NotADirectory { path: PathBuf },

    #[error("failed to walk {}: {source}", path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

impl RepositoryError {
    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::Missing { path } | Self::NotADirectory { path } | Self::Walk { path, .. } => {
                path
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_invalid_message() {
        let err = OrchestratorError::ConfigInvalid {
            reason: "per_test_timeout_seconds must be positive".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid configuration: per_test_timeout_seconds must be positive"
        );
    }

    #[test]
    fn test_repository_unavailable_message() {
        let err = OrchestratorError::RepositoryUnavailable {
            path: PathBuf::from("/nope"),
            reason: "path does not exist".to_string(),
        };
        assert!(err.to_string().contains("/nope"));
    }

    #[test]
    fn test_analysis_error_messages() {
        assert!(AnalysisError::Decode { offset: 3 }
            .to_string()
            .contains("offset 3"));
        assert_eq!(
            AnalysisError::TooLarge {
                size: 10,
                limit: 5
            }
            .to_string(),
            "file is 10 bytes, limit is 5"
        );
    }

    #[test]
    fn test_repository_error_path() {
        let err = RepositoryError::Missing {
            path: PathBuf::from("/missing"),
        };
        assert_eq!(err.path(), std::path::Path::new("/missing"));
    }
}
