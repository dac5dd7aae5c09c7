//! Output formatting utilities for the CLI.

use std::time::Duration;

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use crate::domain::models::{ApplyOutcome, IssueResult, RunSummary};
use crate::services::{LoopOutcome, LoopReport};

const SPINNER_TEMPLATE: &str = "[{elapsed_precise}] {spinner:.green} {msg}";
const SPINNER_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

pub trait CommandOutput: Serialize {
    fn to_human(&self) -> String;
    fn to_json(&self) -> serde_json::Value;
}

pub fn output<T: CommandOutput>(result: &T, json_mode: bool) {
    if json_mode {
        println!("{}", serde_json::to_string_pretty(&result.to_json()).unwrap_or_default());
    } else {
        println!("{}", result.to_human());
    }
}

/// Truncate a string to a maximum number of characters, appending "..." if truncated.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

/// Spinner drawn on stderr while a run is in progress.
pub fn create_spinner(message: impl Into<String>) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template(SPINNER_TEMPLATE)
            .expect("Invalid spinner template")
            .tick_chars(SPINNER_CHARS),
    );
    spinner.set_message(message.into());
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

pub fn base_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn header(names: &[&str]) -> Vec<Cell> {
    names
        .iter()
        .map(|name| Cell::new(name).add_attribute(Attribute::Bold))
        .collect()
}

/// Status label, table color and one-line detail for a result.
pub fn describe(result: &IssueResult) -> (&'static str, Color, String) {
    match result {
        IssueResult::Applied { outcome } => match outcome {
            ApplyOutcome::Committed {
                branch, review_url, ..
            } => (
                "committed",
                Color::Green,
                review_url
                    .as_ref()
                    .map_or_else(|| branch.clone(), |url| format!("{branch} ({url})")),
            ),
            ApplyOutcome::AwaitingReview { branch, reason, .. } => {
                ("review", Color::Yellow, format!("{branch}: {reason}"))
            }
            ApplyOutcome::RolledBack { reason, .. } => {
                ("rolled back", Color::Red, first_line(reason))
            }
            ApplyOutcome::DryRun { actions } => ("dry run", Color::Cyan, actions.join("; ")),
            ApplyOutcome::NoChanges => ("no changes", Color::DarkGrey, String::new()),
        },
        IssueResult::AlreadyResolved => ("resolved", Color::Green, "already on disk".to_string()),
        IssueResult::Escalated { reuse_count } => (
            "escalated",
            Color::Magenta,
            format!("reused {reuse_count} times; needs review"),
        ),
        IssueResult::NotConverged { failed_passes } => (
            "not converged",
            Color::Red,
            format!("{failed_passes} failed passes"),
        ),
        IssueResult::NoVerifiedFix { attempts, critique } => (
            "unverified",
            Color::Red,
            format!("{attempts} attempts: {}", first_line(critique)),
        ),
        IssueResult::DuplicateOutput => (
            "duplicate",
            Color::DarkGrey,
            "same output as last time".to_string(),
        ),
        IssueResult::AlreadyProcessed => ("skipped", Color::DarkGrey, "already processed".to_string()),
        IssueResult::AlreadyPresent { path, evidence } => {
            ("present", Color::Green, format!("{path} ({evidence})"))
        }
        IssueResult::Aborted { state, error } => ("aborted", Color::Red, format!("in {state}: {error}")),
    }
}

fn first_line(text: &str) -> String {
    text.lines().find(|l| !l.trim().is_empty()).unwrap_or_default().trim().to_string()
}

/// Human/JSON rendering of a finished run.
#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct SummaryOutput(pub RunSummary);

impl CommandOutput for SummaryOutput {
    fn to_human(&self) -> String {
        let summary = &self.0;
        let mut lines = Vec::new();

        let mode = if summary.dry_run { " (dry run)" } else { "" };
        lines.push(format!(
            "{} {} issue(s) from {} signals{mode}",
            console::style("Run").bold(),
            summary.issues_detected,
            summary.kind,
        ));

        if !summary.reports.is_empty() {
            let mut table = base_table();
            table.set_header(header(&["ID", "Signature", "Result", "Detail"]));
            for report in &summary.reports {
                let (label, color, detail) = describe(&report.result);
                table.add_row(vec![
                    Cell::new(crate::domain::models::short_id(&report.issue_id)),
                    Cell::new(truncate(&report.signature, 48)),
                    Cell::new(label).fg(color),
                    Cell::new(truncate(&detail, 60)),
                ]);
            }
            lines.push(table.to_string());
        }

        lines.push(format!(
            "auto-applied: {}  review: {}  rolled back: {}  escalated: {}  unresolved: {}",
            summary.auto_applied(),
            summary.review_artifacts(),
            summary.rolled_back(),
            summary.escalated(),
            summary.unresolved(),
        ));
        if !summary.issues_matched.is_empty() {
            lines.push(format!("matched stored resolutions: {}", summary.issues_matched.len()));
        }
        if !summary.issues_forgotten.is_empty() {
            lines.push(format!(
                "forgotten (no longer failing): {}",
                summary
                    .issues_forgotten
                    .iter()
                    .map(|id| crate::domain::models::short_id(id))
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }
        if !summary.files_changed.is_empty() {
            lines.push("files changed:".to_string());
            lines.extend(summary.files_changed.iter().map(|p| format!("  {p}")));
        }
        if !summary.files_skipped.is_empty() {
            lines.push("files skipped:".to_string());
            lines.extend(
                summary
                    .files_skipped
                    .iter()
                    .map(|s| format!("  {} ({})", s.path, s.reason)),
            );
        }
        if summary.cancelled {
            lines.push(console::style("run cancelled").yellow().to_string());
        }

        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Per-iteration table of a `mender loop` run.
#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct LoopOutput(pub LoopReport);

impl CommandOutput for LoopOutput {
    fn to_human(&self) -> String {
        let report = &self.0;
        let mut lines = vec![format!(
            "{} {} iteration(s)",
            console::style("Loop").bold(),
            report.iterations
        )];

        if !report.steps.is_empty() {
            let mut table = base_table();
            table.set_header(header(&["Iter", "Phase", "Issues", "Committed", "Review", "Rolled back", "Unresolved"]));
            for step in &report.steps {
                let summary = &step.summary;
                table.add_row(vec![
                    Cell::new(step.iteration),
                    Cell::new(step.phase),
                    Cell::new(summary.issues_detected),
                    Cell::new(summary.auto_applied()),
                    Cell::new(summary.review_artifacts()),
                    Cell::new(summary.rolled_back()),
                    Cell::new(summary.unresolved()),
                ]);
            }
            lines.push(table.to_string());
        }

        let outcome = match report.outcome {
            LoopOutcome::Green => console::style(report.outcome.to_string()).green(),
            LoopOutcome::LimitReached => console::style(report.outcome.to_string()).yellow(),
            LoopOutcome::Stalled | LoopOutcome::Cancelled => console::style(report.outcome.to_string()).red(),
        };
        lines.push(format!("committed: {}  outcome: {outcome}", report.committed()));
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::IssueKind;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a longer string", 8), "a lon...");
        assert_eq!(truncate("ééééé", 4), "é...");
    }

    #[test]
    fn test_describe_rollback_uses_first_line() {
        let result = IssueResult::Applied {
            outcome: ApplyOutcome::RolledBack {
                branch: "mender/x".to_string(),
                restored: vec![],
                reason: "\ntests failed\nmore".to_string(),
            },
        };
        let (label, _, detail) = describe(&result);
        assert_eq!(label, "rolled back");
        assert_eq!(detail, "tests failed");
    }

    #[test]
    fn test_summary_human_and_json() {
        let mut summary = RunSummary::new(IssueKind::Diagnostic, true);
        summary.issues_detected = 1;
        summary.record(
            "abcdef0123456789",
            "src/a.rs:3: error: boom",
            IssueResult::Applied {
                outcome: ApplyOutcome::DryRun {
                    actions: vec!["write src/a.rs".to_string()],
                },
            },
        );
        let out = SummaryOutput(summary);

        let human = out.to_human();
        assert!(human.contains("(dry run)"));
        assert!(human.contains("abcdef01"));
        assert!(human.contains("write src/a.rs"));

        let json = out.to_json();
        assert_eq!(json["dry_run"], true);
        assert_eq!(json["reports"][0]["status"], "applied");
        assert_eq!(json["reports"][0]["outcome"]["outcome"], "dry_run");
    }

    #[test]
    fn test_describe_present_feature() {
        let (label, _, detail) = describe(&IssueResult::AlreadyPresent {
            path: "src/export.rs".to_string(),
            evidence: "file name".to_string(),
        });
        assert_eq!(label, "present");
        assert_eq!(detail, "src/export.rs (file name)");
    }

    #[test]
    fn test_loop_output() {
        use crate::services::{LoopPhase, LoopStep};

        let mut summary = RunSummary::new(IssueKind::Diagnostic, false);
        summary.issues_detected = 2;
        let out = LoopOutput(LoopReport {
            iterations: 2,
            outcome: LoopOutcome::Stalled,
            steps: vec![LoopStep {
                iteration: 1,
                phase: LoopPhase::Repair,
                summary,
            }],
        });

        let human = out.to_human();
        assert!(human.contains("2 iteration(s)"));
        assert!(human.contains("repair"));
        assert!(human.contains("stalled"));

        let json = out.to_json();
        assert_eq!(json["outcome"], "stalled");
        assert_eq!(json["steps"][0]["phase"], "repair");
        assert_eq!(json["steps"][0]["summary"]["issues_detected"], 2);
    }
}
