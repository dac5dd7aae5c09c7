//! Generator port - interface for candidate-producing backends.

use async_trait::async_trait;

use crate::domain::errors::GenerationError;
use crate::domain::models::{Issue, Proposal};

/// Input to one generation pass.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub issue: Issue,
    /// Log excerpt, source snippet or backlog text describing the issue.
    pub context: String,
    /// Output of the previous pass, fed forward.
    pub previous: Option<Proposal>,
    /// One-based pass number.
    pub pass: u32,
}

impl GenerationRequest {
    pub fn new(issue: Issue, context: impl Into<String>) -> Self {
        Self {
            issue,
            context: context.into(),
            previous: None,
            pass: 1,
        }
    }
}

/// A backend able to propose file contents for an issue or feature.
///
/// Implementations must not touch the working tree; proposals are applied
/// only by the apply state machine.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Backend name used in logs and proposals.
    fn name(&self) -> &str;

    async fn propose(&self, request: &GenerationRequest) -> Result<Proposal, GenerationError>;
}
