//! The run loop: signals in, applied or escalated candidates out.
//!
//! One subject at a time, strictly in order:
//! extract -> match/forget -> reuse or (converge -> verify -> dedupe -> score)
//! -> apply/rollback -> record -> checkpoint.
//!
//! State is loaded once, threaded through every step explicitly, and saved
//! after each subject so an interrupted run loses at most one subject.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    content_hash, ApplyOutcome, ApplyReport, Candidate, CandidateOrigin, ConfidenceMetrics, Config, Issue,
    IssueKind, IssueResult, RunState, RunSummary, SkippedFile, StoredResolution,
};
use crate::domain::ports::{
    BuildOutcome, BuildRunner, GenerationRequest, Generator, Refiner, SelfCheck, StateRepository,
    VerificationUnit, VersionControl,
};
use crate::services::apply_orchestrator::{build_spec, ApplyError, ApplyOrchestrator, ApplyPolicy};
use crate::services::cancel::CancelFlag;
use crate::services::confidence_scorer::{score, EvidenceCollector};
use crate::services::content_store::ContentStore;
use crate::services::context_builder::ContextBuilder;
use crate::services::convergence_filter::{ConvergenceFilter, ConvergencePolicy};
use crate::services::feature_detector::FeatureDetector;
use crate::services::signal_extractor::{BacklogExtractor, BuildLogExtractor};
use crate::services::signature_matcher::SignatureMatcher;
use crate::services::verifier::{VerificationOutcome, Verifier};

/// Where the run's subjects come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Captured build/test output.
    BuildLog(String),
    /// Run the configured build and use its output.
    Build,
    /// Backlog document, relative to the repository root.
    Backlog(String),
}

/// Collaborators behind the ports.
#[derive(Clone)]
pub struct RepairComponents {
    pub generator: Arc<dyn Generator>,
    pub refiner: Option<Arc<dyn Refiner>>,
    pub checker: Arc<dyn SelfCheck>,
    pub vcs: Arc<dyn VersionControl>,
    pub runner: Arc<dyn BuildRunner>,
    pub state: Arc<dyn StateRepository>,
}

pub struct RepairLoop {
    root: PathBuf,
    config: Config,
    store: ContentStore,
    generator: Arc<dyn Generator>,
    runner: Arc<dyn BuildRunner>,
    state_repo: Arc<dyn StateRepository>,
    verifier: Verifier,
    orchestrator: ApplyOrchestrator,
    extractor: BuildLogExtractor,
    matcher: SignatureMatcher,
    convergence: ConvergenceFilter,
    context: ContextBuilder,
    evidence: EvidenceCollector,
    detector: Option<FeatureDetector>,
    cancel: CancelFlag,
    force: bool,
}

/// Subject being processed plus the text it came from.
struct Subject<'a> {
    issue: &'a Issue,
    log: Option<&'a str>,
    backlog: Option<(&'a str, &'a str)>,
}

impl RepairLoop {
    pub fn new(config: Config, root: impl Into<PathBuf>, components: RepairComponents) -> DomainResult<Self> {
        let root = root.into();
        let extractor = BuildLogExtractor::new(&config.signals)
            .map_err(|e| DomainError::ValidationFailed(format!("invalid signal pattern: {e}")))?;
        let store = ContentStore::new(&root);
        let orchestrator = ApplyOrchestrator::new(
            store.clone(),
            components.vcs,
            components.runner.clone(),
            ApplyPolicy::from_config(&config, &root),
        );
        let verifier = Verifier::new(
            components.refiner,
            components.checker,
            config.verifier.max_attempts,
        );

        Ok(Self {
            matcher: SignatureMatcher::new(config.signals.overlap_threshold),
            convergence: ConvergenceFilter::new(ConvergencePolicy::from(&config.convergence)),
            context: ContextBuilder::from_config(&config),
            evidence: EvidenceCollector::new(&config.state_dir),
            detector: config
                .backlog
                .skip_present
                .then(|| FeatureDetector::new(&config.state_dir, config.backlog.min_token_matches)),
            generator: components.generator,
            runner: components.runner,
            state_repo: components.state,
            cancel: CancelFlag::new(),
            force: false,
            root,
            store,
            verifier,
            orchestrator,
            extractor,
            config,
        })
    }

    #[must_use]
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.orchestrator = self.orchestrator.with_cancel_flag(cancel.clone());
        self.cancel = cancel;
        self
    }

    /// Reprocess features already marked as handled.
    #[must_use]
    pub const fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub const fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run the configured build once.
    pub async fn build(&self) -> BuildOutcome {
        let spec = build_spec(&self.config.build, &self.root);
        info!(program = %spec.program, "running build to collect diagnostics");
        let outcome = self.runner.run(&spec).await;
        if outcome.success {
            info!("build succeeded");
        }
        outcome
    }

    /// Whether `path`, or the configured fallback, can be read as a backlog.
    pub fn backlog_exists(&self, path: &str) -> bool {
        self.read_backlog(path).is_ok()
    }

    #[instrument(skip(self, source), fields(dry_run = self.config.dry_run))]
    pub async fn run(&self, source: Source) -> DomainResult<RunSummary> {
        let mut state = self.state_repo.load().await?;

        let (kind, log, backlog) = match source {
            Source::BuildLog(text) => (IssueKind::Diagnostic, Some(text), None),
            Source::Build => {
                let outcome = self.build().await;
                (IssueKind::Diagnostic, Some(outcome.combined_output()), None)
            }
            Source::Backlog(path) => {
                let (path, text) = self.read_backlog(&path)?;
                (IssueKind::Feature, None, Some((path, text)))
            }
        };

        let issues = match (&log, &backlog) {
            (Some(log), _) => self.extractor.extract(log),
            (None, Some((_, text))) => BacklogExtractor::extract(text),
            (None, None) => Vec::new(),
        };

        let mut summary = RunSummary::new(kind, self.config.dry_run);
        summary.issues_detected = issues.len();
        info!(kind = %kind, issues = issues.len(), "extracted issues");

        if kind == IssueKind::Feature && self.force {
            info!(cleared = state.processed.len(), "force: clearing processed set");
            state.processed.clear();
        }

        let matches = self.matcher.reconcile(kind, &issues, &mut state.issues);
        summary.issues_matched = matches.matched.keys().cloned().collect();
        summary.issues_forgotten = matches.forgotten.iter().map(|r| r.issue_id.clone()).collect();

        let mut attempted = 0usize;
        for issue in &issues {
            if self.cancel.is_cancelled() {
                warn!("run cancelled between subjects");
                summary.cancelled = true;
                break;
            }
            if self.config.max_items.is_some_and(|max| attempted >= max) {
                info!(max_items = attempted, "item limit reached");
                break;
            }

            if let Some(key) = processed_key(issue) {
                if state.processed.contains(&key) {
                    summary.record(&issue.id, &issue.signature, IssueResult::AlreadyProcessed);
                    continue;
                }
            }
            if let Some(result) = self.already_present(issue, backlog.as_ref().map(|(p, _)| p.as_str())) {
                if let Some(key) = processed_key(issue) {
                    state.processed.insert(key);
                }
                summary.record(&issue.id, &issue.signature, result);
                continue;
            }
            attempted += 1;

            let subject = Subject {
                issue,
                log: log.as_deref(),
                backlog: backlog.as_ref().map(|(p, t)| (p.as_str(), t.as_str())),
            };
            let stored_id = matches.matched.get(&issue.id).map(|r| r.issue_id.clone());
            let mut skipped = Vec::new();
            let result = match stored_id {
                Some(stored_id) if state.issues.get(&stored_id).is_some() => {
                    self.reuse(&subject, &stored_id, &mut state, &mut skipped).await
                }
                _ => self.repair(&subject, &mut state, &mut skipped).await,
            };
            summary.files_skipped.extend(skipped);

            let result = match result {
                Ok(result) => result,
                Err(ApplyError::Cancelled(at)) => {
                    warn!(issue_id = %issue.short_id(), state = %at, "apply cancelled; working tree restored");
                    summary.cancelled = true;
                    summary.record(
                        &issue.id,
                        &issue.signature,
                        IssueResult::Aborted {
                            state: at.to_string(),
                            error: "cancelled".to_string(),
                        },
                    );
                    break;
                }
                Err(ApplyError::Aborted { state: at, message }) => {
                    warn!(issue_id = %issue.short_id(), state = %at, error = %message, "apply aborted");
                    IssueResult::Aborted {
                        state: at.to_string(),
                        error: message,
                    }
                }
            };

            if let IssueResult::Applied { outcome } = &result {
                if let ApplyOutcome::Committed { files, .. } | ApplyOutcome::AwaitingReview { files, .. } =
                    outcome
                {
                    summary.add_changed(files.iter().cloned());
                }
            }
            if let Some(key) = processed_key(issue) {
                if marks_processed(&result) {
                    state.processed.insert(key);
                }
            }
            summary.record(&issue.id, &issue.signature, result);
            self.checkpoint(&state).await;
        }

        summary.finish();
        if !self.config.dry_run {
            self.state_repo.save(&state).await?;
        }
        info!(
            run_id = %summary.run_id,
            committed = summary.auto_applied(),
            reviews = summary.review_artifacts(),
            rolled_back = summary.rolled_back(),
            escalated = summary.escalated(),
            "run finished"
        );
        Ok(summary)
    }

    fn read_backlog(&self, path: &str) -> DomainResult<(String, String)> {
        let fallback = self.config.backlog.fallback.as_str();
        for candidate in [path, fallback] {
            if candidate.is_empty() {
                continue;
            }
            match self.store.read_text(candidate) {
                Ok(Some(text)) => return Ok((candidate.to_string(), text)),
                Ok(None) => info!(path = %candidate, "backlog not found"),
                Err(err) => warn!(path = %candidate, error = %err, "backlog unreadable"),
            }
        }
        Err(DomainError::ValidationFailed(format!(
            "no backlog found at {path} or {fallback}"
        )))
    }

    /// Presence check for backlog items; forced runs always regenerate.
    fn already_present(&self, issue: &Issue, backlog_path: Option<&str>) -> Option<IssueResult> {
        if issue.kind != IssueKind::Feature || self.force {
            return None;
        }
        let detector = self.detector.as_ref()?;
        let excluded = [
            backlog_path.unwrap_or_default(),
            self.config.backlog.path.as_str(),
            self.config.backlog.fallback.as_str(),
        ];
        let found = detector.detect(&self.root, issue, &excluded)?;
        info!(
            issue_id = %issue.short_id(),
            path = %found.path,
            evidence = %found.evidence,
            "backlog item already present; skipping generation"
        );
        Some(IssueResult::AlreadyPresent {
            path: found.path,
            evidence: found.evidence.to_string(),
        })
    }

    async fn checkpoint(&self, state: &RunState) {
        if self.config.dry_run {
            return;
        }
        if let Err(err) = self.state_repo.save(state).await {
            warn!(error = %err, "checkpoint failed");
        }
    }

    /// Reapply a remembered resolution, or escalate it once the reuse bound is hit.
    async fn reuse(
        &self,
        subject: &Subject<'_>,
        stored_id: &str,
        state: &mut RunState,
        skipped: &mut Vec<SkippedFile>,
    ) -> Result<IssueResult, ApplyError> {
        let issue = subject.issue;
        let Some(stored) = state.issues.get_mut(stored_id) else {
            return self.repair(subject, state, skipped).await;
        };

        if !stored.can_reuse(self.config.max_reuse) {
            stored.needs_review = true;
            warn!(
                issue_id = %issue.short_id(),
                reuse_count = stored.reuse_count,
                "reuse bound reached; escalating to manual review"
            );
            return Ok(IssueResult::Escalated {
                reuse_count: stored.reuse_count,
            });
        }

        let candidate = Candidate {
            issue_id: issue.id.clone(),
            title: title_for(issue),
            origin: CandidateOrigin::Reused,
            files: stored.files.clone(),
            metrics: ConfidenceMetrics::new(0, 1.0, 0),
            score: 1.0,
        };
        info!(issue_id = %issue.short_id(), reuse_count = stored.reuse_count, "reusing stored resolution");

        let report = self.orchestrator.execute(&candidate, &mut state.ledger).await?;
        skipped.extend(report.skipped.iter().cloned());
        if matches!(report.outcome, ApplyOutcome::NoChanges) {
            return Ok(IssueResult::AlreadyResolved);
        }

        if let Some(stored) = state.issues.get_mut(stored_id) {
            match &report.outcome {
                ApplyOutcome::Committed { .. } | ApplyOutcome::AwaitingReview { .. } => stored.mark_reused(),
                ApplyOutcome::RolledBack { .. } => {
                    // no longer fixes the issue on its own
                    stored.needs_review = true;
                }
                ApplyOutcome::DryRun { .. } | ApplyOutcome::NoChanges => {}
            }
        }
        Self::record_regressions(&report, &candidate, state);
        Ok(IssueResult::Applied {
            outcome: report.outcome,
        })
    }

    /// Generate, converge, verify, score and apply a fresh candidate.
    #[instrument(skip(self, subject, state, skipped), fields(issue_id = %subject.issue.short_id()))]
    async fn repair(
        &self,
        subject: &Subject<'_>,
        state: &mut RunState,
        skipped: &mut Vec<SkippedFile>,
    ) -> Result<IssueResult, ApplyError> {
        let issue = subject.issue;
        let context = self.context.build(issue, subject.log, &self.store);

        let generator = self.generator.clone();
        let report = self
            .convergence
            .converge(|pass| {
                let generator = generator.clone();
                let request = GenerationRequest {
                    issue: issue.clone(),
                    context: context.clone(),
                    previous: pass.previous,
                    pass: pass.pass,
                };
                async move { generator.propose(&request).await }
            })
            .await;

        if !report.converged() {
            return Ok(IssueResult::NotConverged {
                failed_passes: report.failed_passes,
            });
        }

        let mut working = BTreeMap::new();
        let mut originals = BTreeMap::new();
        let mut protected = Vec::new();
        for (path, content) in &report.accepted.files {
            let original = self.store.read_text(path).ok().flatten().unwrap_or_default();
            if self.context.is_protected(&original) {
                info!(path = %path, "skipping protected file");
                skipped.push(SkippedFile::new(path.clone(), "protected"));
                protected.push(path.clone());
                continue;
            }
            working.insert(path.clone(), content.clone());
            originals.insert(path.clone(), original);
        }

        // Each file is checked with the rest of the candidate staged beside it;
        // refined content replaces the proposal for the files checked after it.
        let mut verified = BTreeMap::new();
        for (path, original) in originals {
            let Some(content) = working.get(&path).cloned() else {
                continue;
            };
            let companions = working
                .iter()
                .filter(|(other, _)| **other != path)
                .map(|(other, c)| (other.clone(), c.clone()))
                .collect();
            let unit = VerificationUnit {
                issue: issue.clone(),
                path: path.clone(),
                original,
                context: context.clone(),
                companions,
            };
            match self.verifier.verify_and_refine(&unit, Some(&content)).await {
                VerificationOutcome::Verified { content, .. } => {
                    working.insert(path.clone(), content.clone());
                    verified.insert(path, content);
                }
                VerificationOutcome::Exhausted {
                    attempts,
                    last_critique,
                } => {
                    return Ok(IssueResult::NoVerifiedFix {
                        attempts,
                        critique: format!("{path}: {last_critique}"),
                    });
                }
            }
        }

        if verified.is_empty() {
            return Ok(IssueResult::NoVerifiedFix {
                attempts: 0,
                critique: format!("every proposed file is protected: {}", protected.join(", ")),
            });
        }

        let fresh: BTreeMap<String, String> = verified
            .into_iter()
            .filter(|(path, content)| {
                let duplicate = Verifier::is_duplicate(&state.attempts, path, content);
                if duplicate {
                    info!(path = %path, "verified output repeats the previous attempt");
                }
                !duplicate
            })
            .collect();
        if fresh.is_empty() {
            return Ok(IssueResult::DuplicateOutput);
        }
        for (path, content) in &fresh {
            Verifier::record_output(&mut state.attempts, path, content);
        }

        let metrics = self.evidence.collect(
            &self.root,
            &fresh,
            report.accepted.confidence.unwrap_or(0.0),
            &state.attempts,
        );
        let mut files = fresh;
        if let Some((backlog_path, backlog_text)) = subject.backlog {
            if let Some(updated) = BacklogExtractor::mark_done(backlog_text, &issue.sample_text) {
                files.insert(backlog_path.to_string(), updated);
            }
        }

        let candidate = Candidate {
            issue_id: issue.id.clone(),
            title: title_for(issue),
            origin: CandidateOrigin::Generated,
            files,
            score: score(&metrics),
            metrics,
        };
        info!(score = candidate.score, files = candidate.files.len(), "scored candidate");

        let report = self.orchestrator.execute(&candidate, &mut state.ledger).await?;
        skipped.extend(report.skipped.iter().cloned());
        if let ApplyOutcome::Committed { .. } = &report.outcome {
            let mut files = candidate.files.clone();
            if let Some((backlog_path, _)) = subject.backlog {
                files.remove(backlog_path);
            }
            state.issues.remember(StoredResolution::new(issue, files));
        }
        Self::record_regressions(&report, &candidate, state);

        Ok(IssueResult::Applied {
            outcome: report.outcome,
        })
    }

    /// Remember the exact content that broke the post-apply test, so only a
    /// repeat of it is penalized.
    fn record_regressions(report: &ApplyReport, candidate: &Candidate, state: &mut RunState) {
        if let ApplyOutcome::RolledBack { .. } = &report.outcome {
            for path in &report.written {
                if let Some(content) = candidate.files.get(path) {
                    state.attempts.record_regression(path.clone(), content_hash(content));
                }
            }
        }
    }
}

fn title_for(issue: &Issue) -> String {
    match issue.kind {
        IssueKind::Feature => issue.sample_text.clone(),
        IssueKind::Diagnostic => issue.signature.clone(),
    }
}

/// Features are tracked in the processed set by canonical name.
fn processed_key(issue: &Issue) -> Option<String> {
    match issue.kind {
        IssueKind::Feature => issue.subject_name.clone(),
        IssueKind::Diagnostic => None,
    }
}

fn marks_processed(result: &IssueResult) -> bool {
    match result {
        IssueResult::AlreadyResolved | IssueResult::AlreadyPresent { .. } => true,
        IssueResult::Applied { outcome } => matches!(
            outcome,
            ApplyOutcome::Committed { .. } | ApplyOutcome::AwaitingReview { .. }
        ),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_processed_key_only_for_features() {
        assert_eq!(
            processed_key(&Issue::feature("add export command")).as_deref(),
            Some("AddExportCommand")
        );
        assert_eq!(processed_key(&Issue::diagnostic("a.rs:1: error: x", "x")), None);
    }

    #[test]
    fn test_marks_processed() {
        assert!(marks_processed(&IssueResult::AlreadyResolved));
        assert!(marks_processed(&IssueResult::AlreadyPresent {
            path: "src/export.rs".to_string(),
            evidence: "file name".to_string(),
        }));
        assert!(!marks_processed(&IssueResult::DuplicateOutput));
        assert!(!marks_processed(&IssueResult::Applied {
            outcome: ApplyOutcome::DryRun { actions: vec![] }
        }));
        assert!(marks_processed(&IssueResult::Applied {
            outcome: ApplyOutcome::Committed {
                branch: "mender/x".to_string(),
                files: vec![],
                review_url: None,
            }
        }));
    }
}
