//! `git` (and optionally `gh`) driven as subprocesses.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::adapters::process::{run_process, ProcessError, ProcessSpec};
use crate::domain::errors::VcsError;
use crate::domain::models::VcsConfig;
use crate::domain::ports::VersionControl;

const GIT_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct GitCli {
    root: PathBuf,
    git: String,
    review: String,
}

impl GitCli {
    pub fn new(root: impl Into<PathBuf>, config: &VcsConfig) -> Self {
        Self {
            root: root.into(),
            git: config.git_program.clone(),
            review: config.review_program.clone(),
        }
    }

    async fn run(&self, program: &str, args: &[String]) -> Result<String, VcsError> {
        let command = format!("{program} {}", args.join(" "));
        debug!(command = %command, "running VCS command");
        let output = run_process(ProcessSpec {
            program,
            args,
            working_dir: &self.root,
            stdin: None,
            timeout: GIT_TIMEOUT,
        })
        .await
        .map_err(|err| match err {
            ProcessError::Spawn { source, .. } | ProcessError::Io { source, .. } => VcsError::Spawn(source),
            timeout @ ProcessError::Timeout { .. } => VcsError::CommandFailed {
                command: command.clone(),
                stderr: timeout.to_string(),
            },
        })?;

        if !output.success {
            return Err(VcsError::CommandFailed {
                command,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output.stdout)
    }

    async fn git(&self, args: &[&str]) -> Result<String, VcsError> {
        let args: Vec<String> = args.iter().map(|a| (*a).to_string()).collect();
        self.run(&self.git, &args).await
    }

    async fn git_with_paths(&self, args: &[&str], paths: &[String]) -> Result<String, VcsError> {
        let mut all: Vec<String> = args.iter().map(|a| (*a).to_string()).collect();
        all.push("--".to_string());
        all.extend(paths.iter().cloned());
        self.run(&self.git, &all).await
    }
}

#[async_trait]
impl VersionControl for GitCli {
    async fn current_branch(&self) -> Result<String, VcsError> {
        Ok(self.git(&["rev-parse", "--abbrev-ref", "HEAD"]).await?.trim().to_string())
    }

    async fn create_branch(&self, name: &str) -> Result<(), VcsError> {
        self.git(&["checkout", "-b", name]).await.map(drop)
    }

    async fn checkout(&self, name: &str) -> Result<(), VcsError> {
        self.git(&["checkout", name]).await.map(drop)
    }

    async fn delete_branch(&self, name: &str) -> Result<(), VcsError> {
        self.git(&["branch", "-D", name]).await.map(drop)
    }

    async fn add(&self, paths: &[String]) -> Result<(), VcsError> {
        if paths.is_empty() {
            return Ok(());
        }
        self.git_with_paths(&["add"], paths).await.map(drop)
    }

    async fn commit(&self, message: &str) -> Result<(), VcsError> {
        self.git(&["commit", "-m", message]).await.map(drop)
    }

    async fn revert(&self, paths: &[String]) -> Result<(), VcsError> {
        if paths.is_empty() {
            return Ok(());
        }
        self.git_with_paths(&["checkout", "HEAD"], paths).await.map(drop)
    }

    async fn open_review(&self, branch: &str, title: &str, body: &str) -> Result<Option<String>, VcsError> {
        self.git(&["push", "-u", "origin", branch]).await?;
        let args: Vec<String> = ["pr", "create", "--head", branch, "--title", title, "--body", body]
            .iter()
            .map(|a| (*a).to_string())
            .collect();
        let stdout = self.run(&self.review, &args).await?;
        let url = stdout
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| line.starts_with("http"))
            .map(str::to_string);
        info!(branch, url = ?url, "opened review request");
        Ok(url)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn repo() -> Option<(TempDir, GitCli)> {
        let tmp = TempDir::new().unwrap();
        let git = GitCli::new(tmp.path(), &VcsConfig::default());
        // Skip when git is not installed.
        git.git(&["init", "-q", "-b", "main"]).await.ok()?;
        git.git(&["config", "user.email", "mender@example.invalid"]).await.ok()?;
        git.git(&["config", "user.name", "mender"]).await.ok()?;
        std::fs::write(tmp.path().join("README.md"), "hello\n").unwrap();
        git.add(&["README.md".to_string()]).await.ok()?;
        git.commit("init").await.ok()?;
        Some((tmp, git))
    }

    #[tokio::test]
    async fn test_branch_commit_and_cleanup() {
        let Some((tmp, git)) = repo().await else {
            return;
        };
        assert_eq!(git.current_branch().await.unwrap(), "main");

        git.create_branch("mender/fix-1").await.unwrap();
        assert_eq!(git.current_branch().await.unwrap(), "mender/fix-1");
        std::fs::write(tmp.path().join("README.md"), "changed\n").unwrap();
        git.add(&["README.md".to_string()]).await.unwrap();
        git.commit("change").await.unwrap();

        git.checkout("main").await.unwrap();
        assert_eq!(std::fs::read_to_string(tmp.path().join("README.md")).unwrap(), "hello\n");
        git.delete_branch("mender/fix-1").await.unwrap();
        assert!(git.checkout("mender/fix-1").await.is_err());
    }

    #[tokio::test]
    async fn test_revert_discards_changes() {
        let Some((tmp, git)) = repo().await else {
            return;
        };
        std::fs::write(tmp.path().join("README.md"), "scribble\n").unwrap();
        git.revert(&["README.md".to_string()]).await.unwrap();
        assert_eq!(std::fs::read_to_string(tmp.path().join("README.md")).unwrap(), "hello\n");
    }
}
