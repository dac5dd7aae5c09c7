//! In-memory version control for tests and dry runs.

use std::collections::BTreeSet;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::errors::VcsError;
use crate::domain::ports::VersionControl;

#[derive(Debug)]
struct MockState {
    current: String,
    branches: BTreeSet<String>,
    commits: Vec<(String, String, Vec<String>)>,
    staged: Vec<String>,
    operations: Vec<String>,
}

/// Tracks branches and commits without touching any repository.
#[derive(Debug)]
pub struct MockVcs {
    state: Mutex<MockState>,
    fail_commit: bool,
    review_url: Option<String>,
}

impl Default for MockVcs {
    fn default() -> Self {
        Self::new("main")
    }
}

impl MockVcs {
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            state: Mutex::new(MockState {
                current: base.clone(),
                branches: BTreeSet::from([base]),
                commits: Vec::new(),
                staged: Vec::new(),
                operations: Vec::new(),
            }),
            fail_commit: false,
            review_url: None,
        }
    }

    #[must_use]
    pub fn failing_commits(mut self) -> Self {
        self.fail_commit = true;
        self
    }

    #[must_use]
    pub fn with_review_url(mut self, url: impl Into<String>) -> Self {
        self.review_url = Some(url.into());
        self
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MockState) -> T) -> Result<T, VcsError> {
        let mut state = self.state.lock().map_err(|_| VcsError::CommandFailed {
            command: "mock".to_string(),
            stderr: "state lock poisoned".to_string(),
        })?;
        Ok(f(&mut state))
    }

    pub fn current(&self) -> String {
        self.with_state(|s| s.current.clone()).unwrap_or_default()
    }

    pub fn branches(&self) -> Vec<String> {
        self.with_state(|s| s.branches.iter().cloned().collect()).unwrap_or_default()
    }

    /// `(branch, message, files)` per commit.
    pub fn commits(&self) -> Vec<(String, String, Vec<String>)> {
        self.with_state(|s| s.commits.clone()).unwrap_or_default()
    }

    pub fn operations(&self) -> Vec<String> {
        self.with_state(|s| s.operations.clone()).unwrap_or_default()
    }
}

fn failed(command: &str, stderr: impl Into<String>) -> VcsError {
    VcsError::CommandFailed {
        command: command.to_string(),
        stderr: stderr.into(),
    }
}

#[async_trait]
impl VersionControl for MockVcs {
    async fn current_branch(&self) -> Result<String, VcsError> {
        self.with_state(|s| s.current.clone())
    }

    async fn create_branch(&self, name: &str) -> Result<(), VcsError> {
        self.with_state(|s| {
            s.operations.push(format!("create_branch {name}"));
            if !s.branches.insert(name.to_string()) {
                return Err(failed("create_branch", format!("branch {name} already exists")));
            }
            s.current = name.to_string();
            Ok(())
        })?
    }

    async fn checkout(&self, name: &str) -> Result<(), VcsError> {
        self.with_state(|s| {
            s.operations.push(format!("checkout {name}"));
            if !s.branches.contains(name) {
                return Err(failed("checkout", format!("no such branch {name}")));
            }
            s.current = name.to_string();
            Ok(())
        })?
    }

    async fn delete_branch(&self, name: &str) -> Result<(), VcsError> {
        self.with_state(|s| {
            s.operations.push(format!("delete_branch {name}"));
            if s.current == name {
                return Err(failed("delete_branch", "cannot delete the checked out branch"));
            }
            s.branches.remove(name);
            s.commits.retain(|(branch, _, _)| branch != name);
            Ok(())
        })?
    }

    async fn add(&self, paths: &[String]) -> Result<(), VcsError> {
        self.with_state(|s| {
            s.operations.push(format!("add {}", paths.join(" ")));
            s.staged.extend(paths.iter().cloned());
        })
    }

    async fn commit(&self, message: &str) -> Result<(), VcsError> {
        let fail = self.fail_commit;
        self.with_state(|s| {
            s.operations.push("commit".to_string());
            if fail {
                return Err(failed("commit", "commit rejected"));
            }
            let files = std::mem::take(&mut s.staged);
            s.commits.push((s.current.clone(), message.to_string(), files));
            Ok(())
        })?
    }

    async fn revert(&self, paths: &[String]) -> Result<(), VcsError> {
        self.with_state(|s| s.operations.push(format!("revert {}", paths.join(" "))))
    }

    async fn open_review(&self, branch: &str, _title: &str, _body: &str) -> Result<Option<String>, VcsError> {
        let url = self.review_url.clone();
        self.with_state(|s| s.operations.push(format!("open_review {branch}")))?;
        Ok(url)
    }
}
