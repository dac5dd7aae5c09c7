//! Model client port - text-in/text-out completion backends.

use async_trait::async_trait;

use crate::domain::errors::GenerationError;

/// A single completion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRequest {
    pub system: String,
    pub prompt: String,
}

impl ModelRequest {
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
        }
    }
}

/// Trait for model backends (local CLI, remote HTTP advisor).
#[async_trait]
pub trait ModelClient: Send + Sync {
    fn name(&self) -> &str;

    /// Return the raw reply text.
    async fn complete(&self, request: &ModelRequest) -> Result<String, GenerationError>;
}
