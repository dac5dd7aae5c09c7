//! `mender issues`: inspect and manage the issue memory.

use anyhow::{anyhow, Context, Result};
use clap::{Args, Subcommand};
use comfy_table::{Cell, Color};
use serde::Serialize;

use crate::adapters::state::JsonStateRepository;
use crate::cli::output::{base_table, header, output, truncate, CommandOutput};
use crate::cli::CommandContext;
use crate::domain::models::{short_id, Config, IssueMemory, StoredResolution};
use crate::domain::ports::StateRepository;

#[derive(Args, Debug)]
pub struct IssuesArgs {
    #[command(subcommand)]
    pub command: IssuesCommands,
}

#[derive(Subcommand, Debug)]
pub enum IssuesCommands {
    /// List remembered resolutions
    List {
        /// Only entries waiting for human review
        #[arg(long)]
        needs_review: bool,
    },
    /// Forget a resolution (the issue is considered resolved)
    Forget {
        /// Issue ID or unique prefix
        id: String,
    },
    /// Clear the review flag and reuse count of a resolution
    Reset {
        /// Issue ID or unique prefix
        id: String,
    },
}

#[derive(Debug, Serialize)]
pub struct ResolutionOutput {
    pub id: String,
    pub kind: String,
    pub signature: String,
    pub files: Vec<String>,
    pub reuse_count: u32,
    pub needs_review: bool,
    pub last_applied_at: Option<String>,
}

impl From<&StoredResolution> for ResolutionOutput {
    fn from(resolution: &StoredResolution) -> Self {
        Self {
            id: resolution.issue_id.clone(),
            kind: resolution.kind.to_string(),
            signature: resolution.signature.clone(),
            files: resolution.files.keys().cloned().collect(),
            reuse_count: resolution.reuse_count,
            needs_review: resolution.needs_review,
            last_applied_at: resolution
                .last_applied_at
                .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ResolutionListOutput {
    pub resolutions: Vec<ResolutionOutput>,
    pub total: usize,
}

impl CommandOutput for ResolutionListOutput {
    fn to_human(&self) -> String {
        if self.resolutions.is_empty() {
            return "No remembered resolutions.".to_string();
        }

        let mut table = base_table();
        table.set_header(header(&["ID", "Kind", "Signature", "Files", "Reused", "Review"]));
        for r in &self.resolutions {
            let review = if r.needs_review {
                Cell::new("needed").fg(Color::Yellow)
            } else {
                Cell::new("-")
            };
            table.add_row(vec![
                Cell::new(short_id(&r.id)),
                Cell::new(&r.kind),
                Cell::new(truncate(&r.signature, 50)),
                Cell::new(r.files.join("\n")),
                Cell::new(r.reuse_count),
                review,
            ]);
        }
        format!("{table}\n\n{} resolution(s)", self.total)
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[derive(Debug, Serialize)]
pub struct IssueActionOutput {
    pub success: bool,
    pub message: String,
    pub resolution: Option<ResolutionOutput>,
}

impl CommandOutput for IssueActionOutput {
    fn to_human(&self) -> String {
        self.message.clone()
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

fn resolve(memory: &IssueMemory, prefix: &str) -> Result<String> {
    memory
        .resolve_id(prefix)
        .ok_or_else(|| anyhow!("No unique remembered issue matches '{prefix}'"))
}

pub async fn execute(args: IssuesArgs, config: Config, ctx: &CommandContext) -> Result<()> {
    let repo = JsonStateRepository::new(ctx.root.join(&config.state_dir));
    let mut state = repo.load().await.context("Failed to load state")?;

    match args.command {
        IssuesCommands::List { needs_review } => {
            let resolutions: Vec<ResolutionOutput> = state
                .issues
                .iter()
                .filter(|r| !needs_review || r.needs_review)
                .map(ResolutionOutput::from)
                .collect();
            let total = resolutions.len();
            output(&ResolutionListOutput { resolutions, total }, ctx.json);
        }
        IssuesCommands::Forget { id } => {
            let id = resolve(&state.issues, &id)?;
            let removed = state.issues.forget(&id);
            repo.save(&state).await.context("Failed to save state")?;
            output(
                &IssueActionOutput {
                    success: true,
                    message: format!("Forgot issue {}", short_id(&id)),
                    resolution: removed.as_ref().map(ResolutionOutput::from),
                },
                ctx.json,
            );
        }
        IssuesCommands::Reset { id } => {
            let id = resolve(&state.issues, &id)?;
            let resolution = state
                .issues
                .get_mut(&id)
                .ok_or_else(|| anyhow!("Issue {id} disappeared from memory"))?;
            resolution.needs_review = false;
            resolution.reuse_count = 0;
            let snapshot = ResolutionOutput::from(&*resolution);
            repo.save(&state).await.context("Failed to save state")?;
            output(
                &IssueActionOutput {
                    success: true,
                    message: format!("Reset issue {}; it may be reused again", short_id(&id)),
                    resolution: Some(snapshot),
                },
                ctx.json,
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Issue;
    use std::collections::BTreeMap;

    fn memory_with(ids: &[&str]) -> IssueMemory {
        let mut memory = IssueMemory::new();
        for id in ids {
            let mut issue = Issue::diagnostic(format!("error {id}"), "sample");
            issue.id = (*id).to_string();
            memory.remember(StoredResolution::new(&issue, BTreeMap::new()));
        }
        memory
    }

    #[test]
    fn test_resolve_prefix() {
        let memory = memory_with(&["abc123", "abd456"]);
        assert_eq!(resolve(&memory, "abc").unwrap(), "abc123");
        assert!(resolve(&memory, "ab").is_err());
        assert!(resolve(&memory, "zzz").is_err());
    }

    #[test]
    fn test_list_output_marks_review() {
        let mut memory = memory_with(&["abc123"]);
        memory.get_mut("abc123").unwrap().needs_review = true;
        let resolutions: Vec<ResolutionOutput> = memory.iter().map(ResolutionOutput::from).collect();
        let out = ResolutionListOutput { total: 1, resolutions };
        assert!(out.to_human().contains("needed"));
        assert_eq!(out.to_json()["resolutions"][0]["needs_review"], true);
    }
}
