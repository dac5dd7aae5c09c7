//! Persisted run-state port.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::RunState;

/// Loads and saves the issue memory, content ledger, processed set and
/// attempt cache as one unit.
#[async_trait]
pub trait StateRepository: Send + Sync {
    /// Missing documents load as empty.
    async fn load(&self) -> DomainResult<RunState>;

    /// Every document is rewritten atomically.
    async fn save(&self, state: &RunState) -> DomainResult<()>;
}
