//! Argument parsing for the `mender` binary.

use clap::Parser;

use mender::cli::commands::issues::IssuesCommands;
use mender::cli::{Cli, Commands};

fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
    Cli::try_parse_from(std::iter::once("mender").chain(args.iter().copied()))
}

#[test]
fn test_fix_from_log() {
    let cli = parse(&["fix", "--log", "build.log"]).unwrap();
    let Commands::Fix(args) = cli.command else {
        panic!("expected fix");
    };
    assert_eq!(args.log.as_deref(), Some(std::path::Path::new("build.log")));
    assert!(!args.build);
    assert!(!args.flags.dry_run);
}

#[test]
fn test_fix_from_build_with_flags() {
    let cli = parse(&[
        "fix",
        "--build",
        "--dry-run",
        "--auto-apply",
        "--confidence-threshold",
        "0.7",
        "--passes",
        "5",
        "--max-items",
        "2",
    ])
    .unwrap();
    let Commands::Fix(args) = cli.command else {
        panic!("expected fix");
    };
    assert!(args.build);
    assert!(args.flags.dry_run);
    assert!(args.flags.auto_apply);
    assert!(!args.flags.allow_create);
    assert_eq!(args.flags.confidence_threshold, Some(0.7));
    assert_eq!(args.flags.passes, Some(5));
    assert_eq!(args.flags.max_items, Some(2));
}

#[test]
fn test_fix_needs_exactly_one_source() {
    assert!(parse(&["fix"]).is_err());
    assert!(parse(&["fix", "--log", "build.log", "--build"]).is_err());
}

#[test]
fn test_features_defaults() {
    let cli = parse(&["features"]).unwrap();
    let Commands::Features(args) = cli.command else {
        panic!("expected features");
    };
    assert!(args.backlog.is_none());
    assert!(!args.force);

    let cli = parse(&["features", "--backlog", "plan.md", "--force", "--allow-create"]).unwrap();
    let Commands::Features(args) = cli.command else {
        panic!("expected features");
    };
    assert_eq!(args.backlog.as_deref(), Some("plan.md"));
    assert!(args.force);
    assert!(args.flags.allow_create);
}

#[test]
fn test_issues_subcommands() {
    let cli = parse(&["issues", "list", "--needs-review"]).unwrap();
    let Commands::Issues(args) = cli.command else {
        panic!("expected issues");
    };
    assert!(matches!(args.command, IssuesCommands::List { needs_review: true }));

    let cli = parse(&["issues", "forget", "3fa9c2"]).unwrap();
    let Commands::Issues(args) = cli.command else {
        panic!("expected issues");
    };
    assert!(matches!(args.command, IssuesCommands::Forget { ref id } if id == "3fa9c2"));

    assert!(parse(&["issues", "reset"]).is_err());
}

#[test]
fn test_global_flags_after_subcommand() {
    let cli = parse(&["config", "show", "--json", "--config", "alt.yaml"]).unwrap();
    assert!(cli.json);
    assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("alt.yaml")));
    assert!(matches!(cli.command, Commands::Config(_)));
}

#[test]
fn test_invalid_number_is_rejected() {
    assert!(parse(&["fix", "--build", "--passes", "many"]).is_err());
}

#[test]
fn test_loop_with_iteration_limit() {
    let cli = parse(&["loop", "--max-iterations", "4", "--backlog", "plan.md", "--auto-apply"]).unwrap();
    let Commands::Loop(args) = cli.command else {
        panic!("expected loop");
    };
    assert_eq!(args.max_iterations, Some(4));
    assert_eq!(args.backlog.as_deref(), Some("plan.md"));
    assert!(args.flags.auto_apply);
}

#[test]
fn test_loop_defaults_and_bad_limit() {
    let cli = parse(&["loop"]).unwrap();
    let Commands::Loop(args) = cli.command else {
        panic!("expected loop");
    };
    assert_eq!(args.max_iterations, None);
    assert!(parse(&["loop", "--max-iterations", "many"]).is_err());
}
