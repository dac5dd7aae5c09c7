//! `mender features`: implement backlog items.

use anyhow::Result;
use clap::Args;

use crate::cli::commands::{run_loop, RunFlags};
use crate::cli::CommandContext;
use crate::domain::models::Config;
use crate::services::Source;

#[derive(Args, Debug)]
pub struct FeaturesArgs {
    /// Backlog document (defaults to backlog.path, then backlog.fallback)
    #[arg(long, value_name = "FILE")]
    pub backlog: Option<String>,

    /// Reprocess items already marked as handled
    #[arg(long)]
    pub force: bool,

    #[command(flatten)]
    pub flags: RunFlags,
}

pub async fn execute(args: FeaturesArgs, mut config: Config, ctx: &CommandContext) -> Result<()> {
    args.flags.apply_to(&mut config)?;
    let backlog = args.backlog.unwrap_or_else(|| config.backlog.path.clone());
    run_loop(config, ctx, Source::Backlog(backlog), args.force).await
}
