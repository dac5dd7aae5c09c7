//! Version control port.

use async_trait::async_trait;

use crate::domain::errors::VcsError;

/// Version-control operations used by the apply state machine.
///
/// Each operation is assumed atomic at the VCS level.
#[async_trait]
pub trait VersionControl: Send + Sync {
    async fn current_branch(&self) -> Result<String, VcsError>;

    /// Create `name` from the current HEAD and switch to it.
    async fn create_branch(&self, name: &str) -> Result<(), VcsError>;

    async fn checkout(&self, name: &str) -> Result<(), VcsError>;

    async fn delete_branch(&self, name: &str) -> Result<(), VcsError>;

    async fn add(&self, paths: &[String]) -> Result<(), VcsError>;

    async fn commit(&self, message: &str) -> Result<(), VcsError>;

    /// Discard uncommitted changes to `paths`.
    async fn revert(&self, paths: &[String]) -> Result<(), VcsError>;

    /// Open a review request for `branch`, returning its URL when known.
    async fn open_review(
        &self,
        branch: &str,
        title: &str,
        body: &str,
    ) -> Result<Option<String>, VcsError>;
}
