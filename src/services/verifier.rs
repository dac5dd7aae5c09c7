//! Verify-and-refine loop.
//!
//! Analyze once, then alternate rewrite and self-check until a check passes
//! or the attempt budget runs out. Every failed check's critique is appended
//! to the plan before the next rewrite.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::domain::models::{content_hash, AttemptCache};
use crate::domain::ports::{Analysis, Critique, Refiner, SelfCheck, VerificationUnit};

const CRITIQUE_HEADER: &str = "\n\n# Critique & notes:\n";

/// Result of verifying one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum VerificationOutcome {
    Verified {
        content: String,
        attempts: u32,
        analysis: Analysis,
    },
    /// No candidate passed; nothing may be applied.
    Exhausted { attempts: u32, last_critique: String },
}

pub struct Verifier {
    refiner: Option<Arc<dyn Refiner>>,
    checker: Arc<dyn SelfCheck>,
    max_attempts: u32,
}

impl Verifier {
    pub fn new(refiner: Option<Arc<dyn Refiner>>, checker: Arc<dyn SelfCheck>, max_attempts: u32) -> Self {
        Self {
            refiner,
            checker,
            max_attempts: max_attempts.max(1),
        }
    }

    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    async fn analyze(&self, unit: &VerificationUnit) -> Analysis {
        let fallback = || Analysis {
            explanation: String::new(),
            plan: format!("Resolve: {}", unit.issue.signature),
        };
        let Some(refiner) = &self.refiner else {
            return fallback();
        };
        match refiner.analyze(unit).await {
            Ok(analysis) if !analysis.plan.trim().is_empty() => analysis,
            Ok(_) => fallback(),
            Err(err) => {
                warn!(error = %err, "analysis failed; planning from the signature");
                fallback()
            }
        }
    }

    /// Verify `initial` (if given) and refine it until a self-check passes.
    ///
    /// Without `initial`, the first attempt is a rewrite from the plan.
    #[instrument(skip(self, unit, initial), fields(path = %unit.path, issue_id = %unit.issue.short_id()))]
    pub async fn verify_and_refine(&self, unit: &VerificationUnit, initial: Option<&str>) -> VerificationOutcome {
        let analysis = self.analyze(unit).await;
        let mut plan = analysis.plan.clone();
        let mut last_critique = String::new();
        let mut attempts = 0;

        for attempt in 1..=self.max_attempts {
            let candidate = if let (1, Some(initial)) = (attempt, initial) {
                initial.to_string()
            } else {
                let Some(refiner) = &self.refiner else {
                    info!(attempt, "no refiner configured; stopping after the proposed candidate");
                    if last_critique.is_empty() {
                        last_critique = "no refiner configured".to_string();
                    }
                    break;
                };
                attempts = attempt;
                match refiner.rewrite(unit, &plan).await {
                    Ok(rewrite) => rewrite,
                    Err(err) => {
                        warn!(attempt, error = %err, "rewrite failed");
                        last_critique = format!("rewrite failed: {err}");
                        append_critique(&mut plan, &last_critique);
                        continue;
                    }
                }
            };
            attempts = attempt;

            if candidate.trim().is_empty() {
                warn!(attempt, "rewrite was empty");
                last_critique = "rewrite was empty".to_string();
                append_critique(&mut plan, &last_critique);
                continue;
            }

            let critique = match self.checker.check(unit, &candidate).await {
                Ok(critique) => critique,
                Err(err) => {
                    warn!(attempt, checker = self.checker.name(), error = %err, "self-check failed to run");
                    Critique::fail(format!("self-check failed to run: {err}"))
                }
            };

            if critique.ok {
                info!(attempt, checker = self.checker.name(), "candidate verified");
                return VerificationOutcome::Verified {
                    content: candidate,
                    attempts: attempt,
                    analysis,
                };
            }

            info!(attempt, checker = self.checker.name(), "self-check rejected candidate");
            last_critique = critique.critique;
            append_critique(&mut plan, &last_critique);
        }

        warn!(attempts, "verification exhausted");
        VerificationOutcome::Exhausted {
            attempts,
            last_critique,
        }
    }

    /// Whether `content` repeats the last verified output for `unit`.
    pub fn is_duplicate(attempts: &AttemptCache, unit: &str, content: &str) -> bool {
        attempts.last_hash(unit) == Some(content_hash(content).as_str())
    }

    pub fn record_output(attempts: &mut AttemptCache, unit: &str, content: &str) {
        attempts.record_hash(unit, content_hash(content));
    }
}

fn append_critique(plan: &mut String, critique: &str) {
    plan.push_str(CRITIQUE_HEADER);
    plan.push_str(critique);
}
