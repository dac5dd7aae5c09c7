//! Command-line interface.

pub mod commands;
pub mod output;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::domain::models::Config;
use crate::infrastructure::config::ConfigLoader;

#[derive(Parser, Debug)]
#[command(name = "mender")]
#[command(about = "Unattended build-repair and backlog loop", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Load configuration from this file instead of .mender/ and MENDER_* variables
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Repair build failures from a log or a fresh build
    Fix(commands::fix::FixArgs),
    /// Implement unchecked backlog items
    Features(commands::features::FeaturesArgs),
    /// Build, repair and implement backlog items until green or stuck
    #[command(name = "loop")]
    Loop(commands::cycle::LoopArgs),
    /// Inspect and manage remembered resolutions
    Issues(commands::issues::IssuesArgs),
    /// Show or validate the effective configuration
    Config(commands::config::ConfigArgs),
}

/// Per-invocation settings shared by every command.
#[derive(Debug, Clone)]
pub struct CommandContext {
    /// Repository root; the working directory
    pub root: PathBuf,
    pub config_path: Option<PathBuf>,
    pub json: bool,
}

impl CommandContext {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let root = std::env::current_dir().context("Failed to determine working directory")?;
        Ok(Self {
            root,
            config_path: cli.config.clone(),
            json: cli.json,
        })
    }

    pub fn load_config(&self) -> Result<Config> {
        match &self.config_path {
            Some(path) => ConfigLoader::load_from_file(path),
            None => ConfigLoader::load(&self.root),
        }
    }
}

/// Print the error and exit non-zero.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let body = serde_json::json!({
            "success": false,
            "error": format!("{err:#}"),
        });
        println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("{} {err:#}", console::style("error:").red().bold());
    }
    std::process::exit(1);
}
