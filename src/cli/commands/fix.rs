//! `mender fix`: repair build failures.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use crate::cli::commands::{run_loop, RunFlags};
use crate::cli::CommandContext;
use crate::domain::models::Config;
use crate::services::Source;

#[derive(Args, Debug)]
pub struct FixArgs {
    /// Captured build/test output to repair
    #[arg(long, value_name = "FILE", required_unless_present = "build", conflicts_with = "build")]
    pub log: Option<PathBuf>,

    /// Run the configured build command and repair what it reports
    #[arg(long)]
    pub build: bool,

    #[command(flatten)]
    pub flags: RunFlags,
}

pub async fn execute(args: FixArgs, mut config: Config, ctx: &CommandContext) -> Result<()> {
    args.flags.apply_to(&mut config)?;

    let source = match args.log {
        Some(path) => {
            let text = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("Failed to read build log {}", path.display()))?;
            Source::BuildLog(text)
        }
        None => Source::Build,
    };

    run_loop(config, ctx, source, false).await
}
