//! End-of-run summary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::apply::{ApplyOutcome, SkippedFile};
use super::issue::IssueKind;

/// Per-issue result line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IssueResult {
    /// Candidate went through the apply state machine.
    Applied { outcome: ApplyOutcome },
    /// A stored resolution was already present on disk.
    AlreadyResolved,
    /// Stored resolution hit the reuse bound.
    Escalated { reuse_count: u32 },
    /// No path survived convergence.
    NotConverged { failed_passes: u32 },
    /// Verification exhausted its attempts.
    NoVerifiedFix { attempts: u32, critique: String },
    /// Verified output matched the previous invocation's output.
    DuplicateOutput,
    /// Skipped because it was already processed.
    AlreadyProcessed,
    /// Backlog item the repository already appears to implement.
    AlreadyPresent { path: String, evidence: String },
    /// The apply state machine aborted.
    Aborted { state: String, error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueReport {
    pub issue_id: String,
    pub signature: String,
    #[serde(flatten)]
    pub result: IssueResult,
}

/// Everything an operator needs to know about one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub kind: IssueKind,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub issues_detected: usize,
    pub issues_matched: Vec<String>,
    pub issues_forgotten: Vec<String>,
    pub files_changed: Vec<String>,
    pub files_skipped: Vec<SkippedFile>,
    pub reports: Vec<IssueReport>,
    pub cancelled: bool,
}

impl RunSummary {
    pub fn new(kind: IssueKind, dry_run: bool) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            kind,
            dry_run,
            started_at: Utc::now(),
            finished_at: None,
            issues_detected: 0,
            issues_matched: Vec::new(),
            issues_forgotten: Vec::new(),
            files_changed: Vec::new(),
            files_skipped: Vec::new(),
            reports: Vec::new(),
            cancelled: false,
        }
    }

    pub fn record(&mut self, issue_id: &str, signature: &str, result: IssueResult) {
        self.reports.push(IssueReport {
            issue_id: issue_id.to_string(),
            signature: signature.to_string(),
            result,
        });
    }

    pub fn add_changed(&mut self, paths: impl IntoIterator<Item = String>) {
        for path in paths {
            if !self.files_changed.contains(&path) {
                self.files_changed.push(path);
            }
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    fn count_outcomes(&self, pred: impl Fn(&ApplyOutcome) -> bool) -> usize {
        self.reports
            .iter()
            .filter(|r| matches!(&r.result, IssueResult::Applied { outcome } if pred(outcome)))
            .count()
    }

    /// Candidates committed without a human in the loop.
    pub fn auto_applied(&self) -> usize {
        self.count_outcomes(|o| matches!(o, ApplyOutcome::Committed { .. }))
    }

    /// Candidates left as review artifacts.
    pub fn review_artifacts(&self) -> usize {
        self.count_outcomes(|o| matches!(o, ApplyOutcome::AwaitingReview { .. }))
    }

    pub fn rolled_back(&self) -> usize {
        self.count_outcomes(|o| matches!(o, ApplyOutcome::RolledBack { .. }))
    }

    pub fn escalated(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| matches!(r.result, IssueResult::Escalated { .. }))
            .count()
    }

    /// Issues that ended without any verified fix.
    pub fn unresolved(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| {
                matches!(
                    r.result,
                    IssueResult::NotConverged { .. }
                        | IssueResult::NoVerifiedFix { .. }
                        | IssueResult::Aborted { .. }
                )
            })
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts() {
        let mut summary = RunSummary::new(IssueKind::Diagnostic, false);
        summary.record(
            "a",
            "sig a",
            IssueResult::Applied {
                outcome: ApplyOutcome::Committed {
                    branch: "mender/a".to_string(),
                    files: vec!["a.rs".to_string()],
                    review_url: None,
                },
            },
        );
        summary.record(
            "b",
            "sig b",
            IssueResult::Applied {
                outcome: ApplyOutcome::RolledBack {
                    branch: "mender/b".to_string(),
                    restored: vec![],
                    reason: "tests failed".to_string(),
                },
            },
        );
        summary.record("c", "sig c", IssueResult::Escalated { reuse_count: 20 });
        summary.record(
            "d",
            "sig d",
            IssueResult::NoVerifiedFix {
                attempts: 3,
                critique: "still broken".to_string(),
            },
        );

        assert_eq!(summary.auto_applied(), 1);
        assert_eq!(summary.rolled_back(), 1);
        assert_eq!(summary.review_artifacts(), 0);
        assert_eq!(summary.escalated(), 1);
        assert_eq!(summary.unresolved(), 1);
    }

    #[test]
    fn test_add_changed_dedupes() {
        let mut summary = RunSummary::new(IssueKind::Feature, true);
        summary.add_changed(vec!["a".to_string(), "a".to_string(), "b".to_string()]);
        assert_eq!(summary.files_changed, vec!["a", "b"]);
    }
}
