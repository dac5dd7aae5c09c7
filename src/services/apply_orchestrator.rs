//! Apply/rollback state machine.
//!
//! `Proposed -> Branched -> Applied -> Tested -> {Committed | RolledBack | AwaitingReview}`
//!
//! Nothing touches the working tree before a branch exists, every
//! pre-existing file is backed up byte for byte before it is overwritten,
//! and any failure after `Applied` restores those bytes before returning.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::models::{
    ApplyOutcome, ApplyReport, ApplyState, BackupEntry, BuildConfig, Candidate, CandidateOrigin,
    Config, ContentLedger, SkippedFile,
};
use crate::domain::ports::{BuildRunner, BuildSpec, VersionControl};
use crate::services::cancel::CancelFlag;
use crate::services::content_store::{ContentStore, WriteOptions};

/// Lines of build output kept in rollback reasons.
const OUTPUT_TAIL_LINES: usize = 20;

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("apply aborted in state {state}: {message}")]
    Aborted { state: ApplyState, message: String },

    #[error("apply cancelled in state {0}")]
    Cancelled(ApplyState),
}

impl ApplyError {
    pub const fn state(&self) -> ApplyState {
        match self {
            Self::Aborted { state, .. } | Self::Cancelled(state) => *state,
        }
    }
}

/// Gates and locations for the state machine.
#[derive(Debug, Clone)]
pub struct ApplyPolicy {
    pub dry_run: bool,
    pub auto_apply: bool,
    pub allow_create: bool,
    pub confidence_threshold: f64,
    pub branch_prefix: String,
    pub open_review: bool,
    /// Absolute state directory; backups and review artifacts live below it.
    pub state_dir: PathBuf,
    pub test: BuildSpec,
}

impl ApplyPolicy {
    pub fn from_config(config: &Config, root: &Path) -> Self {
        Self {
            dry_run: config.dry_run,
            auto_apply: config.auto_apply,
            allow_create: config.allow_create,
            confidence_threshold: config.confidence_threshold,
            branch_prefix: config.vcs.branch_prefix.clone(),
            open_review: config.vcs.open_review,
            state_dir: root.join(&config.state_dir),
            test: build_spec(&config.build, root),
        }
    }
}

/// Build spec for the configured build command rooted at `root`.
pub fn build_spec(build: &BuildConfig, root: &Path) -> BuildSpec {
    BuildSpec {
        program: build.program.clone(),
        args: build.args.clone(),
        working_dir: root.to_path_buf(),
        timeout: Duration::from_secs(build.timeout_secs),
    }
}

/// Review artifact left next to an uncommitted review branch.
#[derive(Debug, Serialize)]
struct ReviewArtifact<'a> {
    branch: &'a str,
    base: &'a str,
    reason: &'a str,
    created_at: String,
    candidate: &'a Candidate,
}

pub struct ApplyOrchestrator {
    store: ContentStore,
    vcs: Arc<dyn VersionControl>,
    runner: Arc<dyn BuildRunner>,
    policy: ApplyPolicy,
    cancel: CancelFlag,
}

impl ApplyOrchestrator {
    pub fn new(
        store: ContentStore,
        vcs: Arc<dyn VersionControl>,
        runner: Arc<dyn BuildRunner>,
        policy: ApplyPolicy,
    ) -> Self {
        Self {
            store,
            vcs,
            runner,
            policy,
            cancel: CancelFlag::new(),
        }
    }

    #[must_use]
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub const fn policy(&self) -> &ApplyPolicy {
        &self.policy
    }

    fn check_cancel(&self, state: ApplyState) -> Result<(), ApplyError> {
        if self.cancel.is_cancelled() {
            return Err(ApplyError::Cancelled(state));
        }
        Ok(())
    }

    fn would_commit(&self, candidate: &Candidate) -> bool {
        self.policy.auto_apply && candidate.score >= self.policy.confidence_threshold
    }

    fn review_reason(&self, candidate: &Candidate) -> String {
        if candidate.score < self.policy.confidence_threshold {
            format!(
                "score {:.2} below threshold {:.2}",
                candidate.score, self.policy.confidence_threshold
            )
        } else {
            "autonomous apply disabled".to_string()
        }
    }

    /// Drive `candidate` through the state machine.
    #[instrument(skip(self, candidate, ledger), fields(issue_id = %candidate.issue_id, score = candidate.score))]
    pub async fn execute(
        &self,
        candidate: &Candidate,
        ledger: &mut ContentLedger,
    ) -> Result<ApplyReport, ApplyError> {
        let mut skipped = Vec::new();
        let mut pending: Vec<(&String, &String)> = Vec::new();
        for (path, content) in &candidate.files {
            match self.store.matches_disk(path, content) {
                Ok(true) => skipped.push(SkippedFile::new(path.clone(), "unchanged")),
                Ok(false) => pending.push((path, content)),
                Err(err) => {
                    warn!(path = %path, error = %err, "skipping unreadable target");
                    skipped.push(SkippedFile::new(path.clone(), err.to_string()));
                }
            }
        }

        let report = |outcome, written: Vec<String>, skipped: Vec<SkippedFile>| ApplyReport {
            issue_id: candidate.issue_id.clone(),
            outcome,
            written,
            skipped,
        };

        if pending.is_empty() {
            info!("candidate already present; nothing to apply");
            return Ok(report(ApplyOutcome::NoChanges, Vec::new(), skipped));
        }

        if self.policy.dry_run {
            let actions = self.dry_run_actions(candidate, &pending, ledger);
            return Ok(report(ApplyOutcome::DryRun { actions }, Vec::new(), skipped));
        }

        self.check_cancel(ApplyState::Proposed)?;

        // Proposed -> Branched
        let base = self.vcs.current_branch().await.map_err(|e| ApplyError::Aborted {
            state: ApplyState::Proposed,
            message: e.to_string(),
        })?;
        let branch = branch_name(&self.policy.branch_prefix, candidate);
        self.vcs
            .create_branch(&branch)
            .await
            .map_err(|e| ApplyError::Aborted {
                state: ApplyState::Proposed,
                message: e.to_string(),
            })?;
        info!(branch = %branch, base = %base, "created candidate branch");

        // Branched -> Applied
        let (backups, written) = match self.apply_files(candidate, &pending, ledger, &mut skipped) {
            Ok(applied) => applied,
            Err((backups, message)) => {
                self.restore(&backups, ledger).await;
                self.leave_branch(&base, &branch, true).await;
                return Err(ApplyError::Aborted {
                    state: ApplyState::Branched,
                    message,
                });
            }
        };

        if written.is_empty() {
            self.leave_branch(&base, &branch, true).await;
            return Ok(report(ApplyOutcome::NoChanges, written, skipped));
        }

        if let Err(err) = self.check_cancel(ApplyState::Applied) {
            self.restore(&backups, ledger).await;
            self.leave_branch(&base, &branch, true).await;
            return Err(err);
        }

        // Applied -> Tested
        let test = self.runner.run(&self.policy.test).await;
        info!(success = test.success, timed_out = test.timed_out, "post-apply test finished");

        if !test.success {
            let restored = self.restore(&backups, ledger).await;
            self.leave_branch(&base, &branch, true).await;
            let reason = if test.timed_out {
                "post-apply test timed out".to_string()
            } else {
                format!(
                    "post-apply test failed:\n{}",
                    tail_lines(&test.combined_output(), OUTPUT_TAIL_LINES)
                )
            };
            warn!(branch = %branch, "rolled back candidate");
            return Ok(report(
                ApplyOutcome::RolledBack {
                    branch,
                    restored,
                    reason,
                },
                written,
                skipped,
            ));
        }

        if !self.would_commit(candidate) {
            let reason = self.review_reason(candidate);
            let artifact = match self.write_review_artifact(candidate, &branch, &base, &reason) {
                Ok(path) => path,
                Err(err) => {
                    self.restore(&backups, ledger).await;
                    self.leave_branch(&base, &branch, true).await;
                    return Err(ApplyError::Aborted {
                        state: ApplyState::Tested,
                        message: format!("failed to write review artifact: {err}"),
                    });
                }
            };
            self.restore(&backups, ledger).await;
            self.leave_branch(&base, &branch, false).await;
            info!(branch = %branch, artifact = %artifact.display(), reason = %reason, "left candidate for review");
            return Ok(report(
                ApplyOutcome::AwaitingReview {
                    branch,
                    files: written.clone(),
                    artifact,
                    reason,
                },
                written,
                skipped,
            ));
        }

        // Tested -> Committed
        let commit = async {
            self.vcs.add(&written).await?;
            self.vcs.commit(&commit_message(candidate)).await
        };
        if let Err(err) = commit.await {
            self.restore(&backups, ledger).await;
            self.leave_branch(&base, &branch, true).await;
            return Err(ApplyError::Aborted {
                state: ApplyState::Tested,
                message: err.to_string(),
            });
        }
        info!(branch = %branch, files = written.len(), "committed candidate");

        let review_url = if self.policy.open_review {
            match self
                .vcs
                .open_review(&branch, &candidate.title, &review_body(candidate))
                .await
            {
                Ok(url) => url,
                Err(err) => {
                    warn!(branch = %branch, error = %err, "failed to open review request");
                    None
                }
            }
        } else {
            None
        };
        self.leave_branch(&base, &branch, false).await;

        Ok(report(
            ApplyOutcome::Committed {
                branch,
                files: written.clone(),
                review_url,
            },
            written,
            skipped,
        ))
    }

    fn dry_run_actions(
        &self,
        candidate: &Candidate,
        pending: &[(&String, &String)],
        ledger: &mut ContentLedger,
    ) -> Vec<String> {
        let mut actions = vec![format!(
            "would create branch {}",
            branch_name(&self.policy.branch_prefix, candidate)
        )];
        for (path, content) in pending {
            let exists = self.store.read_bytes(path).ok().flatten().is_some();
            if !exists && !self.policy.allow_create {
                actions.push(format!("skipped: creation disabled {path}"));
                continue;
            }
            match self
                .store
                .write(ledger, path, content, WriteOptions::new(true, self.policy.allow_create))
            {
                Ok(outcome) => actions.push(format!("{} {}", outcome.reason, outcome.path)),
                Err(err) => actions.push(format!("refused {path}: {err}")),
            }
        }
        actions.push(format!(
            "would run {} {}",
            self.policy.test.program,
            self.policy.test.args.join(" ")
        ));
        if self.would_commit(candidate) {
            actions.push("would commit if the test passes".to_string());
        } else {
            actions.push(format!(
                "would leave a review branch ({})",
                self.review_reason(candidate)
            ));
        }
        actions
    }

    /// Back up and write every pending file. On an I/O failure returns the
    /// backups taken so far so the caller can restore them.
    fn apply_files(
        &self,
        candidate: &Candidate,
        pending: &[(&String, &String)],
        ledger: &mut ContentLedger,
        skipped: &mut Vec<SkippedFile>,
    ) -> Result<(Vec<BackupEntry>, Vec<String>), (Vec<BackupEntry>, String)> {
        let backup_dir = self.policy.state_dir.join("backups").join(format!(
            "{}-{}",
            Utc::now().format("%Y%m%dT%H%M%S%.3f"),
            crate::domain::models::short_id(&candidate.issue_id)
        ));
        let options = WriteOptions::new(false, self.policy.allow_create);
        let mut backups = Vec::new();
        let mut written = Vec::new();

        for (path, content) in pending {
            let prior = match self.store.read_bytes(path) {
                Ok(prior) => prior,
                Err(err) => {
                    warn!(path = %path, error = %err, "skipping target");
                    skipped.push(SkippedFile::new(path.as_str(), err.to_string()));
                    continue;
                }
            };

            let backup_path = match &prior {
                Some(bytes) => {
                    let target = backup_dir.join(path.as_str());
                    let saved = target
                        .parent()
                        .map_or(Ok(()), fs::create_dir_all)
                        .and_then(|()| fs::write(&target, bytes));
                    if let Err(err) = saved {
                        return Err((backups, format!("failed to back up {path}: {err}")));
                    }
                    Some(target)
                }
                None => None,
            };

            match self.store.write(ledger, path, content, options) {
                Ok(outcome) if outcome.written => {
                    backups.push(BackupEntry {
                        path: outcome.path.clone(),
                        backup_path,
                    });
                    written.push(outcome.path);
                }
                Ok(outcome) => skipped.push(SkippedFile::new(outcome.path, outcome.reason.as_str())),
                Err(err) if err.is_safety_violation() => {
                    warn!(path = %path, error = %err, "write refused");
                    skipped.push(SkippedFile::new(path.as_str(), err.to_string()));
                }
                Err(err) => return Err((backups, err.to_string())),
            }
        }

        Ok((backups, written))
    }

    /// Put every touched file back to its exact prior bytes; files that did
    /// not exist are removed. Returns the restored paths.
    async fn restore(&self, backups: &[BackupEntry], ledger: &mut ContentLedger) -> Vec<String> {
        let mut restored = Vec::with_capacity(backups.len());
        for entry in backups {
            let result = match &entry.backup_path {
                Some(backup) => fs::read(backup)
                    .map_err(|e| e.to_string())
                    .and_then(|bytes| {
                        self.store
                            .restore_bytes(ledger, &entry.path, &bytes)
                            .map_err(|e| e.to_string())
                    }),
                None => self
                    .store
                    .remove(ledger, &entry.path)
                    .map_err(|e| e.to_string()),
            };
            match result {
                Ok(()) => restored.push(entry.path.clone()),
                Err(err) => {
                    warn!(path = %entry.path, error = %err, "restore from backup failed; reverting through VCS");
                    if let Err(err) = self.vcs.revert(std::slice::from_ref(&entry.path)).await {
                        warn!(path = %entry.path, error = %err, "VCS revert failed");
                    } else {
                        restored.push(entry.path.clone());
                    }
                }
            }
        }
        restored
    }

    /// Switch back to `base`, deleting `branch` when it should not survive.
    async fn leave_branch(&self, base: &str, branch: &str, delete: bool) {
        if let Err(err) = self.vcs.checkout(base).await {
            warn!(base = %base, error = %err, "failed to return to base branch");
            return;
        }
        if delete {
            if let Err(err) = self.vcs.delete_branch(branch).await {
                warn!(branch = %branch, error = %err, "failed to delete candidate branch");
            }
        }
    }

    fn write_review_artifact(
        &self,
        candidate: &Candidate,
        branch: &str,
        base: &str,
        reason: &str,
    ) -> std::io::Result<PathBuf> {
        let path = self
            .policy
            .state_dir
            .join("reviews")
            .join(format!("{}.json", branch.replace('/', "_")));
        let artifact = ReviewArtifact {
            branch,
            base,
            reason,
            created_at: Utc::now().to_rfc3339(),
            candidate,
        };
        let json = serde_json::to_vec_pretty(&artifact).map_err(std::io::Error::other)?;
        crate::services::content_store::atomic_write(&path, &json, true)?;
        Ok(path)
    }
}

/// `<prefix><slug>-<short id>-<timestamp>`.
pub fn branch_name(prefix: &str, candidate: &Candidate) -> String {
    let slug: String = candidate
        .title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|part| !part.is_empty())
        .take(6)
        .collect::<Vec<_>>()
        .join("-");
    let slug = if slug.is_empty() { "fix".to_string() } else { slug };
    // Random suffix keeps two candidates for one issue in the same second apart.
    let nonce = Uuid::new_v4().simple().to_string();
    format!(
        "{prefix}{slug}-{}-{}-{}",
        crate::domain::models::short_id(&candidate.issue_id)
            .get(..8)
            .unwrap_or_default(),
        Utc::now().format("%Y%m%d%H%M%S"),
        &nonce[..6]
    )
}

fn commit_message(candidate: &Candidate) -> String {
    let origin = match candidate.origin {
        CandidateOrigin::Generated => "generated",
        CandidateOrigin::Reused => "reused",
    };
    format!(
        "mender: {}\n\nissue: {}\norigin: {origin}\nscore: {:.2}\n",
        candidate.title, candidate.issue_id, candidate.score
    )
}

fn review_body(candidate: &Candidate) -> String {
    let files = candidate
        .files
        .keys()
        .map(|p| format!("- `{p}`"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Automated change for `{}`.\n\nConfidence score: {:.2} (call sites {}, reported {:.2}, test impact {})\n\nFiles:\n{files}\n",
        candidate.title,
        candidate.score,
        candidate.metrics.call_site_evidence,
        candidate.metrics.self_reported_confidence,
        candidate.metrics.test_impact,
    )
}

fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    lines[lines.len().saturating_sub(n)..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::ConfidenceMetrics;
    use std::collections::BTreeMap;

    fn candidate(title: &str) -> Candidate {
        Candidate {
            issue_id: crate::domain::models::issue_id(title),
            title: title.to_string(),
            origin: CandidateOrigin::Generated,
            files: BTreeMap::new(),
            metrics: ConfidenceMetrics::default(),
            score: 0.5,
        }
    }

    #[test]
    fn test_branch_name_slug() {
        let name = branch_name("mender/", &candidate("src/lib.rs:10: error: Borrow of moved value"));
        assert!(name.starts_with("mender/src-lib-rs-10-error-borrow-"));
        let empty = branch_name("mender/", &candidate("!!!"));
        assert!(empty.starts_with("mender/fix-"));
        assert_ne!(name, branch_name("mender/", &candidate("src/lib.rs:10: error: Borrow of moved value")));
    }

    #[test]
    fn test_tail_lines() {
        assert_eq!(tail_lines("a\nb\nc\nd", 2), "c\nd");
        assert_eq!(tail_lines("a", 5), "a");
        assert_eq!(tail_lines("", 5), "");
    }

    #[test]
    fn test_commit_message_mentions_issue() {
        let c = candidate("fix parser");
        let message = commit_message(&c);
        assert!(message.starts_with("mender: fix parser"));
        assert!(message.contains(&c.issue_id));
        assert!(message.contains("score: 0.50"));
    }
}
