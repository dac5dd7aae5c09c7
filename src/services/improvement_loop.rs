//! `mender loop`: alternate build repair and backlog work until the build is
//! green and nothing is left to do, or no round makes progress.
//!
//! Each iteration runs the build once. A red build feeds its output to the
//! repair run; when that commits nothing, the backlog gets a turn instead.
//! A green build goes straight to the backlog. Progress means at least one
//! committed candidate, since only commits change what the next build sees.

use std::fmt;

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::domain::errors::DomainResult;
use crate::domain::models::RunSummary;
use crate::services::repair_loop::{RepairLoop, Source};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopPhase {
    Repair,
    Features,
}

impl fmt::Display for LoopPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Repair => write!(f, "repair"),
            Self::Features => write!(f, "features"),
        }
    }
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopOutcome {
    /// Build passes and the backlog had nothing left to commit.
    Green,
    /// Build fails and neither repair nor backlog work committed anything.
    Stalled,
    /// Still making progress when the iteration limit ran out.
    LimitReached,
    Cancelled,
}

impl fmt::Display for LoopOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Green => write!(f, "green"),
            Self::Stalled => write!(f, "stalled"),
            Self::LimitReached => write!(f, "iteration limit reached"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// One run inside an iteration.
#[derive(Debug, Clone, Serialize)]
pub struct LoopStep {
    pub iteration: u32,
    pub phase: LoopPhase,
    pub summary: RunSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoopReport {
    pub iterations: u32,
    pub outcome: LoopOutcome,
    pub steps: Vec<LoopStep>,
}

impl LoopReport {
    pub fn committed(&self) -> usize {
        self.steps.iter().map(|s| s.summary.auto_applied()).sum()
    }
}

enum Progress {
    Changed,
    Unchanged,
    Cancelled,
}

pub struct ImprovementLoop<'a> {
    repair: &'a RepairLoop,
    backlog: String,
    max_iterations: u32,
}

impl<'a> ImprovementLoop<'a> {
    pub fn new(repair: &'a RepairLoop, backlog: impl Into<String>, max_iterations: u32) -> Self {
        Self {
            repair,
            backlog: backlog.into(),
            max_iterations: max_iterations.max(1),
        }
    }

    #[instrument(skip(self), fields(max_iterations = self.max_iterations, backlog = %self.backlog))]
    pub async fn run(&self) -> DomainResult<LoopReport> {
        let mut steps = Vec::new();
        let mut iterations = 0;

        let outcome = loop {
            if iterations == self.max_iterations {
                warn!(iterations, "iteration limit reached while still making progress");
                break LoopOutcome::LimitReached;
            }
            if self.repair.is_cancelled() {
                break LoopOutcome::Cancelled;
            }
            iterations += 1;
            info!(iteration = iterations, "improvement iteration");

            let build = self.repair.build().await;
            let progress = if build.success {
                match self.features(iterations, &mut steps).await? {
                    Progress::Unchanged => {
                        info!(iteration = iterations, "build green and backlog settled");
                        break LoopOutcome::Green;
                    }
                    progress => progress,
                }
            } else {
                let source = Source::BuildLog(build.combined_output());
                match self.step(iterations, LoopPhase::Repair, source, &mut steps).await? {
                    Progress::Unchanged => {
                        info!(iteration = iterations, "no fix committed; trying backlog work");
                        match self.features(iterations, &mut steps).await? {
                            Progress::Unchanged => {
                                warn!(iteration = iterations, "build still failing and nothing committed; needs a human");
                                break LoopOutcome::Stalled;
                            }
                            progress => progress,
                        }
                    }
                    progress => progress,
                }
            };
            if let Progress::Cancelled = progress {
                break LoopOutcome::Cancelled;
            }
        };

        info!(iterations, outcome = %outcome, "improvement loop finished");
        Ok(LoopReport {
            iterations,
            outcome,
            steps,
        })
    }

    async fn features(&self, iteration: u32, steps: &mut Vec<LoopStep>) -> DomainResult<Progress> {
        if !self.repair.backlog_exists(&self.backlog) {
            return Ok(Progress::Unchanged);
        }
        let source = Source::Backlog(self.backlog.clone());
        self.step(iteration, LoopPhase::Features, source, steps).await
    }

    async fn step(
        &self,
        iteration: u32,
        phase: LoopPhase,
        source: Source,
        steps: &mut Vec<LoopStep>,
    ) -> DomainResult<Progress> {
        let summary = self.repair.run(source).await?;
        let progress = if summary.cancelled {
            Progress::Cancelled
        } else if summary.auto_applied() > 0 {
            Progress::Changed
        } else {
            Progress::Unchanged
        };
        steps.push(LoopStep {
            iteration,
            phase,
            summary,
        });
        Ok(progress)
    }
}
