//! `mender loop`: keep building, repairing and implementing until done.

use anyhow::{bail, Context, Result};
use clap::Args;

use crate::cli::commands::{prepare_run, RunFlags};
use crate::cli::output::{create_spinner, output, LoopOutput};
use crate::cli::CommandContext;
use crate::domain::models::Config;
use crate::services::{ImprovementLoop, LoopOutcome};

#[derive(Args, Debug)]
pub struct LoopArgs {
    /// Rounds of build, repair and backlog work before giving up
    #[arg(long, value_name = "N")]
    pub max_iterations: Option<u32>,

    /// Backlog document (defaults to backlog.path, then backlog.fallback)
    #[arg(long, value_name = "FILE")]
    pub backlog: Option<String>,

    #[command(flatten)]
    pub flags: RunFlags,
}

pub async fn execute(args: LoopArgs, mut config: Config, ctx: &CommandContext) -> Result<()> {
    if let Some(max) = args.max_iterations {
        config.max_iterations = max;
    }
    args.flags.apply_to(&mut config)?;

    let backlog = args.backlog.unwrap_or_else(|| config.backlog.path.clone());
    let max_iterations = config.max_iterations;
    let repair = prepare_run(config, ctx, false)?;

    let spinner = (!ctx.json).then(|| create_spinner("improving..."));
    let result = ImprovementLoop::new(&repair, backlog, max_iterations).run().await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    let report = result.context("Loop failed")?;

    let outcome = report.outcome;
    output(&LoopOutput(report), ctx.json);
    match outcome {
        LoopOutcome::Cancelled => bail!("loop cancelled"),
        LoopOutcome::Stalled => bail!("build still failing; manual intervention needed"),
        LoopOutcome::Green | LoopOutcome::LimitReached => Ok(()),
    }
}
