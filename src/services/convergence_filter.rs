//! Convergence filter: accept only content that is stable across passes.
//!
//! A generator is run `passes` times, each pass seeing the previous pass's
//! output. For every path proposed in any pass:
//! - the most frequent content wins if its count exceeds `passes * majority_ratio`
//! - otherwise, content the last two passes agree on byte for byte wins
//! - otherwise the path is dropped
//!
//! Failed or empty passes still count toward `passes`, so an unreliable
//! backend converges less often rather than more.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::future::Future;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::errors::GenerationError;
use crate::domain::models::{ConvergenceConfig, Proposal};

/// Thresholds for accepting a path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvergencePolicy {
    pub passes: u32,
    pub majority_ratio: f64,
    pub last_two_fallback: bool,
}

impl Default for ConvergencePolicy {
    fn default() -> Self {
        Self::from(&ConvergenceConfig::default())
    }
}

impl From<&ConvergenceConfig> for ConvergencePolicy {
    fn from(config: &ConvergenceConfig) -> Self {
        Self {
            passes: config.passes.max(1),
            majority_ratio: config.majority_ratio,
            last_two_fallback: config.last_two_fallback,
        }
    }
}

/// What a pass gets to see.
#[derive(Debug, Clone)]
pub struct PassContext {
    /// One-based.
    pub pass: u32,
    pub previous: Option<Proposal>,
}

/// How a path was accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Acceptance {
    Majority,
    LastTwoAgree,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ConvergenceReport {
    /// Accepted content per path, with the mean confidence of the passes that proposed it.
    pub accepted: Proposal,
    pub acceptance: BTreeMap<String, Acceptance>,
    pub dropped: Vec<String>,
    pub passes_run: u32,
    pub failed_passes: u32,
}

impl ConvergenceReport {
    pub fn converged(&self) -> bool {
        !self.accepted.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConvergenceFilter {
    policy: ConvergencePolicy,
}

impl ConvergenceFilter {
    pub const fn new(policy: ConvergencePolicy) -> Self {
        Self { policy }
    }

    pub const fn policy(&self) -> &ConvergencePolicy {
        &self.policy
    }

    /// Run `generate` for every pass and select the stable content.
    pub async fn converge<F, Fut>(&self, mut generate: F) -> ConvergenceReport
    where
        F: FnMut(PassContext) -> Fut,
        Fut: Future<Output = Result<Proposal, GenerationError>>,
    {
        let mut outputs: Vec<Option<Proposal>> = Vec::with_capacity(self.policy.passes as usize);
        let mut failed_passes = 0;

        for pass in 1..=self.policy.passes {
            let previous = outputs.last().cloned().flatten();
            match generate(PassContext { pass, previous }).await {
                Ok(proposal) if proposal.is_empty() => {
                    warn!(pass, backend = %proposal.backend, "generation pass produced no files");
                    failed_passes += 1;
                    outputs.push(None);
                }
                Ok(proposal) => {
                    debug!(pass, backend = %proposal.backend, files = proposal.files.len(), "generation pass complete");
                    outputs.push(Some(proposal));
                }
                Err(err) => {
                    warn!(pass, error = %err, "generation pass failed");
                    failed_passes += 1;
                    outputs.push(None);
                }
            }
        }

        let mut report = self.select(&outputs);
        report.failed_passes = failed_passes;
        info!(
            passes = report.passes_run,
            failed = failed_passes,
            accepted = report.accepted.files.len(),
            dropped = report.dropped.len(),
            "convergence finished"
        );
        report
    }

    /// Pure selection over recorded pass outputs (`None` for a failed pass).
    pub fn select(&self, outputs: &[Option<Proposal>]) -> ConvergenceReport {
        let passes = self.policy.passes.max(u32::try_from(outputs.len()).unwrap_or(u32::MAX));
        let threshold = f64::from(passes) * self.policy.majority_ratio;

        let paths: BTreeSet<&String> = outputs
            .iter()
            .flatten()
            .flat_map(|p| p.files.keys())
            .collect();

        let mut report = ConvergenceReport {
            accepted: Proposal::new("converged"),
            passes_run: u32::try_from(outputs.len()).unwrap_or(u32::MAX),
            ..ConvergenceReport::default()
        };
        let mut confidences: Vec<f64> = Vec::new();

        for path in paths {
            let Some((content, how)) = self.pick(outputs, path, threshold) else {
                debug!(path = %path, "dropping unstable path");
                report.dropped.push(path.clone());
                continue;
            };
            confidences.extend(
                outputs
                    .iter()
                    .flatten()
                    .filter(|p| p.files.get(path).map(String::as_str) == Some(content))
                    .filter_map(|p| p.confidence),
            );
            report.accepted.files.insert(path.clone(), content.to_string());
            report.acceptance.insert(path.clone(), how);
        }

        if !confidences.is_empty() {
            #[allow(clippy::cast_precision_loss)]
            let mean = confidences.iter().sum::<f64>() / confidences.len() as f64;
            report.accepted.confidence = Some(mean.clamp(0.0, 1.0));
        }
        report
    }

    fn pick<'a>(
        &self,
        outputs: &'a [Option<Proposal>],
        path: &str,
        threshold: f64,
    ) -> Option<(&'a str, Acceptance)> {
        // content -> (count, index of last occurrence)
        let mut tally: HashMap<&str, (u32, usize)> = HashMap::new();
        for (index, output) in outputs.iter().enumerate() {
            if let Some(content) = output.as_ref().and_then(|p| p.files.get(path)) {
                let entry = tally.entry(content.as_str()).or_insert((0, index));
                entry.0 += 1;
                entry.1 = index;
            }
        }

        let best = tally
            .iter()
            .max_by(|a, b| a.1 .0.cmp(&b.1 .0).then(a.1 .1.cmp(&b.1 .1)))
            .map(|(content, (count, _))| (*content, *count));
        if let Some((content, count)) = best {
            if f64::from(count) > threshold {
                return Some((content, Acceptance::Majority));
            }
        }

        if !self.policy.last_two_fallback || outputs.len() < 2 {
            return None;
        }
        let last = outputs[outputs.len() - 1].as_ref()?.files.get(path)?;
        let before = outputs[outputs.len() - 2].as_ref()?.files.get(path)?;
        (last == before).then_some((last.as_str(), Acceptance::LastTwoAgree))
    }
}
