//! Apply/rollback state machine types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// States a candidate moves through while being applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyState {
    Proposed,
    Branched,
    Applied,
    Tested,
    Committed,
    RolledBack,
    AwaitingReview,
}

impl ApplyState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Proposed => "proposed",
            Self::Branched => "branched",
            Self::Applied => "applied",
            Self::Tested => "tested",
            Self::Committed => "committed",
            Self::RolledBack => "rolled_back",
            Self::AwaitingReview => "awaiting_review",
        }
    }

    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed | Self::RolledBack | Self::AwaitingReview)
    }

    /// Valid forward transitions.
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Proposed, Self::Branched)
                | (Self::Branched, Self::Applied | Self::RolledBack)
                | (Self::Applied, Self::Tested | Self::RolledBack)
                | (
                    Self::Tested,
                    Self::Committed | Self::RolledBack | Self::AwaitingReview
                )
        )
    }
}

impl std::fmt::Display for ApplyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backup of one file touched by an apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupEntry {
    pub path: String,
    /// Copy of the exact prior bytes; `None` when the file did not exist.
    pub backup_path: Option<PathBuf>,
}

impl BackupEntry {
    pub const fn existed(&self) -> bool {
        self.backup_path.is_some()
    }
}

/// A file left out of an apply, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedFile {
    pub path: String,
    pub reason: String,
}

impl SkippedFile {
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Terminal result of running a candidate through the state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ApplyOutcome {
    /// Dry run: what would have happened.
    DryRun { actions: Vec<String> },
    /// Every file was already up to date or skipped.
    NoChanges,
    Committed {
        branch: String,
        files: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        review_url: Option<String>,
    },
    /// Left on an uncommitted review branch with the candidate as an artifact.
    AwaitingReview {
        branch: String,
        files: Vec<String>,
        artifact: PathBuf,
        reason: String,
    },
    RolledBack {
        branch: String,
        restored: Vec<String>,
        reason: String,
    },
}

impl ApplyOutcome {
    pub const fn state(&self) -> Option<ApplyState> {
        match self {
            Self::Committed { .. } => Some(ApplyState::Committed),
            Self::AwaitingReview { .. } => Some(ApplyState::AwaitingReview),
            Self::RolledBack { .. } => Some(ApplyState::RolledBack),
            Self::DryRun { .. } | Self::NoChanges => None,
        }
    }
}

/// Full report for one apply run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyReport {
    pub issue_id: String,
    pub outcome: ApplyOutcome,
    /// Files actually changed on disk.
    pub written: Vec<String>,
    pub skipped: Vec<SkippedFile>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions() {
        assert!(ApplyState::Proposed.can_transition_to(ApplyState::Branched));
        assert!(ApplyState::Tested.can_transition_to(ApplyState::Committed));
        assert!(ApplyState::Tested.can_transition_to(ApplyState::AwaitingReview));
        assert!(!ApplyState::Proposed.can_transition_to(ApplyState::Committed));
        assert!(!ApplyState::Committed.can_transition_to(ApplyState::RolledBack));
    }

    #[test]
    fn test_terminal_states() {
        assert!(ApplyState::RolledBack.is_terminal());
        assert!(!ApplyState::Applied.is_terminal());
    }
}
