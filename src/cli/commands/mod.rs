//! CLI command implementations.

pub mod config;
pub mod cycle;
pub mod features;
pub mod fix;
pub mod issues;

use anyhow::{bail, Context, Result};
use clap::Args;
use tracing::warn;

use crate::adapters::build_components;
use crate::cli::output::{create_spinner, output, SummaryOutput};
use crate::cli::CommandContext;
use crate::domain::models::Config;
use crate::infrastructure::config::ConfigLoader;
use crate::services::{CancelFlag, RepairLoop, Source};

/// Flags shared by the run commands; each overrides its config value.
#[derive(Args, Debug, Clone, Default)]
pub struct RunFlags {
    /// Report what would change without touching disk, git or state
    #[arg(long)]
    pub dry_run: bool,

    /// Commit candidates that clear the confidence threshold without review
    #[arg(long)]
    pub auto_apply: bool,

    /// Allow candidates to create new files
    #[arg(long)]
    pub allow_create: bool,

    /// Minimum confidence score for autonomous application (0.0-1.0)
    #[arg(long, value_name = "SCORE")]
    pub confidence_threshold: Option<f64>,

    /// Generation passes per issue
    #[arg(long, value_name = "N")]
    pub passes: Option<u32>,

    /// Verify-and-refine attempts per file
    #[arg(long, value_name = "N")]
    pub max_attempts: Option<u32>,

    /// Stop after this many issues
    #[arg(long, value_name = "N")]
    pub max_items: Option<usize>,
}

impl RunFlags {
    /// Apply the flags on top of `config` and re-validate the result.
    pub fn apply_to(&self, config: &mut Config) -> Result<()> {
        config.dry_run |= self.dry_run;
        config.auto_apply |= self.auto_apply;
        config.allow_create |= self.allow_create;
        if let Some(threshold) = self.confidence_threshold {
            config.confidence_threshold = threshold;
        }
        if let Some(passes) = self.passes {
            config.convergence.passes = passes;
        }
        if let Some(attempts) = self.max_attempts {
            config.verifier.max_attempts = attempts;
        }
        if self.max_items.is_some() {
            config.max_items = self.max_items;
        }
        ConfigLoader::validate(config).context("Invalid command-line override")?;
        Ok(())
    }
}

/// Wire the collaborators into a run whose cancel flag is set by Ctrl-C.
///
/// The loop stops at the next step boundary after an interrupt.
pub fn prepare_run(config: Config, ctx: &CommandContext, force: bool) -> Result<RepairLoop> {
    let components = build_components(&config, &ctx.root).context("Failed to set up collaborators")?;

    let cancel = CancelFlag::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; stopping after the current step");
            on_signal.cancel();
        }
    });

    Ok(RepairLoop::new(config, &ctx.root, components)
        .context("Failed to initialize run")?
        .with_cancel_flag(cancel)
        .with_force(force))
}

/// Run the loop over `source` and print the summary.
///
/// Exits non-zero after printing what it finished when cancelled.
pub async fn run_loop(config: Config, ctx: &CommandContext, source: Source, force: bool) -> Result<()> {
    let repair = prepare_run(config, ctx, force)?;

    let spinner = (!ctx.json).then(|| create_spinner("working..."));
    let result = repair.run(source).await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    let summary = result.context("Run failed")?;

    let cancelled = summary.cancelled;
    output(&SummaryOutput(summary), ctx.json);
    if cancelled {
        bail!("run cancelled");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let mut config = Config::default();
        let flags = RunFlags {
            dry_run: true,
            confidence_threshold: Some(0.5),
            passes: Some(3),
            max_attempts: Some(1),
            max_items: Some(2),
            ..RunFlags::default()
        };
        flags.apply_to(&mut config).unwrap();

        assert!(config.dry_run);
        assert!(!config.auto_apply);
        assert!((config.confidence_threshold - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.convergence.passes, 3);
        assert_eq!(config.verifier.max_attempts, 1);
        assert_eq!(config.max_items, Some(2));
    }

    #[test]
    fn test_unset_flags_keep_config() {
        let mut config = Config {
            auto_apply: true,
            max_items: Some(9),
            ..Config::default()
        };
        RunFlags::default().apply_to(&mut config).unwrap();
        assert!(config.auto_apply);
        assert_eq!(config.max_items, Some(9));
        assert_eq!(config.convergence.passes, 5);
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let mut config = Config::default();
        let flags = RunFlags {
            passes: Some(0),
            ..RunFlags::default()
        };
        assert!(flags.apply_to(&mut config).is_err());
    }
}
