use serde::{Deserialize, Serialize};

/// Pipeline position of one discovered file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileState {
    Discovered,
    Classified,
    Analyzed,
    Generated,
    Queued,
    Executed,
    Folded,
    Skipped,
    Failed,
}

impl FileState {
    pub fn is_terminal(self) -> bool {
        matches!(self, FileState::Folded | FileState::Skipped | FileState::Failed)
    }

    /// Whether a file may move from `self` to `next`.
    ///
    /// Stages advance strictly in order. `Skipped` is reachable from any
    /// non-terminal state; `Failed` only after analysis was attempted or the
    /// suite was handed to a runner.
    pub fn can_transition_to(self, next: FileState) -> bool {
        use FileState::*;
        match (self, next) {
            (Discovered, Classified)
            | (Classified, Analyzed)
            | (Analyzed, Generated)
            | (Generated, Queued)
            | (Queued, Executed)
            | (Executed, Folded) => true,
            (Classified | Queued | Executed, Failed) => true,
            (from, Skipped) => !from.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FileState::Discovered => "discovered",
            FileState::Classified => "classified",
            FileState::Analyzed => "analyzed",
            FileState::Generated => "generated",
            FileState::Queued => "queued",
            FileState::Executed => "executed",
            FileState::Folded => "folded",
            FileState::Skipped => "skipped",
            FileState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for FileState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
