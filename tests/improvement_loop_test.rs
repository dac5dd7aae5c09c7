//! The outer build/repair/backlog loop and the presence check over a
//! temporary repository.

mod common;

use mender::adapters::build::ScriptedBuildRunner;
use mender::adapters::generators::ScriptedGenerator;
use mender::domain::errors::GenerationError;
use mender::domain::models::{ApplyOutcome, IssueResult};
use mender::services::{CancelFlag, ImprovementLoop, LoopOutcome, LoopPhase, Source};

use common::{proposal, Harness, BROKEN, FIXED, LOG};

const BACKLOG: &str = "# Plan\n\n- [ ] Add export command\n";

fn phases(report: &mender::services::LoopReport) -> Vec<(u32, LoopPhase)> {
    report.steps.iter().map(|s| (s.iteration, s.phase)).collect()
}

#[tokio::test]
async fn test_green_build_without_backlog_stops_at_once() {
    let h = Harness::fixing();
    h.write("src/lib.rs", FIXED);
    let repair = h.repair_loop();

    let report = ImprovementLoop::new(&repair, "need_work.md", 10).run().await.unwrap();

    assert_eq!(report.outcome, LoopOutcome::Green);
    assert_eq!(report.iterations, 1);
    assert!(report.steps.is_empty());
    assert_eq!(h.runner.call_count(), 1);
    assert_eq!(h.generator.calls(), 0);
}

#[tokio::test]
async fn test_repairs_then_implements_backlog_until_green() {
    let h = Harness::new(
        ScriptedGenerator::constant("scripted", proposal("src/export.rs", "pub fn export() {}\n"))
            .then(Ok(proposal("src/lib.rs", FIXED)))
            .then(Ok(proposal("src/lib.rs", FIXED)))
            .then(Ok(proposal("src/lib.rs", FIXED))),
        // first build fails; self-checks, post-apply tests and later builds pass
        ScriptedBuildRunner::passing().then(ScriptedBuildRunner::failure(LOG)),
    );
    h.write("src/lib.rs", BROKEN);
    h.write("need_work.md", BACKLOG);
    let repair = h.repair_loop();

    let report = ImprovementLoop::new(&repair, "need_work.md", 10).run().await.unwrap();

    assert_eq!(report.outcome, LoopOutcome::Green);
    assert_eq!(report.iterations, 3);
    assert_eq!(
        phases(&report),
        vec![(1, LoopPhase::Repair), (2, LoopPhase::Features), (3, LoopPhase::Features)]
    );
    assert_eq!(report.committed(), 2);
    assert_eq!(h.read("src/lib.rs").as_deref(), Some(FIXED));
    assert!(h.read("src/export.rs").is_some());
    assert!(h.read("need_work.md").unwrap().contains("- [x] Add export command"));
}

#[tokio::test]
async fn test_unfixable_build_stalls() {
    let h = Harness::new(
        ScriptedGenerator::failing(
            "scripted",
            GenerationError::Backend {
                backend: "scripted".to_string(),
                message: "connection refused".to_string(),
            },
        ),
        ScriptedBuildRunner::failing(LOG),
    );
    h.write("src/lib.rs", BROKEN);
    h.write("need_work.md", BACKLOG);
    let repair = h.repair_loop();

    let report = ImprovementLoop::new(&repair, "need_work.md", 10).run().await.unwrap();

    assert_eq!(report.outcome, LoopOutcome::Stalled);
    assert_eq!(report.iterations, 1);
    assert_eq!(phases(&report), vec![(1, LoopPhase::Repair), (1, LoopPhase::Features)]);
    assert_eq!(report.committed(), 0);
    assert_eq!(h.read("src/lib.rs").as_deref(), Some(BROKEN));
}

#[tokio::test]
async fn test_iteration_limit_stops_a_progressing_loop() {
    let h = Harness::new(
        ScriptedGenerator::constant("scripted", proposal("src/lib.rs", FIXED)),
        ScriptedBuildRunner::passing().then(ScriptedBuildRunner::failure(LOG)),
    );
    h.write("src/lib.rs", BROKEN);
    let repair = h.repair_loop();

    let report = ImprovementLoop::new(&repair, "need_work.md", 1).run().await.unwrap();

    assert_eq!(report.outcome, LoopOutcome::LimitReached);
    assert_eq!(report.iterations, 1);
    assert_eq!(report.committed(), 1);
}

#[tokio::test]
async fn test_cancelled_loop_runs_nothing() {
    let h = Harness::fixing();
    let cancel = CancelFlag::new();
    cancel.cancel();
    let repair = h.repair_loop().with_cancel_flag(cancel);

    let report = ImprovementLoop::new(&repair, "need_work.md", 10).run().await.unwrap();

    assert_eq!(report.outcome, LoopOutcome::Cancelled);
    assert_eq!(report.iterations, 0);
    assert_eq!(h.runner.call_count(), 0);
}

#[tokio::test]
async fn test_present_feature_is_skipped_and_marked_processed() {
    let h = Harness::new(
        ScriptedGenerator::constant("scripted", proposal("src/export.rs", "pub fn export() {}\n")),
        ScriptedBuildRunner::passing(),
    );
    h.write("need_work.md", BACKLOG);
    h.write("src/commands/add_export_command.rs", "pub fn run() {}\n");

    let summary = h
        .repair_loop()
        .run(Source::Backlog("need_work.md".to_string()))
        .await
        .unwrap();

    assert_eq!(summary.reports.len(), 1);
    assert_eq!(
        summary.reports[0].result,
        IssueResult::AlreadyPresent {
            path: "src/commands/add_export_command.rs".to_string(),
            evidence: "file name".to_string(),
        }
    );
    assert_eq!(h.generator.calls(), 0);
    assert!(h.vcs.operations().is_empty());
    assert!(h.state().await.processed.contains("AddExportCommand"));
}

fn declared_feature_harness() -> Harness {
    let h = Harness::new(
        ScriptedGenerator::constant("scripted", proposal("src/export.rs", "pub fn export() {}\n")),
        ScriptedBuildRunner::passing(),
    );
    h.write("need_work.md", BACKLOG);
    h.write("src/cli.rs", "pub struct AddExportCommand;\n");
    h
}

#[tokio::test]
async fn test_declared_feature_is_present() {
    let h = declared_feature_harness();
    let summary = h
        .repair_loop()
        .run(Source::Backlog("need_work.md".to_string()))
        .await
        .unwrap();
    assert_eq!(
        summary.reports[0].result,
        IssueResult::AlreadyPresent {
            path: "src/cli.rs".to_string(),
            evidence: "declaration".to_string(),
        }
    );
}

#[tokio::test]
async fn test_forced_run_ignores_presence() {
    let h = declared_feature_harness();
    let summary = h
        .repair_loop()
        .with_force(true)
        .run(Source::Backlog("need_work.md".to_string()))
        .await
        .unwrap();
    assert!(matches!(
        summary.reports[0].result,
        IssueResult::Applied { outcome: ApplyOutcome::Committed { .. } }
    ));
    assert_eq!(h.generator.calls(), 3);
}

#[tokio::test]
async fn test_presence_check_can_be_disabled() {
    let mut h = declared_feature_harness();
    h.config.backlog.skip_present = false;
    let summary = h
        .repair_loop()
        .run(Source::Backlog("need_work.md".to_string()))
        .await
        .unwrap();
    assert!(matches!(
        summary.reports[0].result,
        IssueResult::Applied { outcome: ApplyOutcome::Committed { .. } }
    ));
    assert!(h.read("src/export.rs").is_some());
}
