//! Refiner and self-check ports used by the verify-and-refine loop.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::errors::GenerationError;
use crate::domain::models::Issue;

/// Root-cause explanation and ordered change plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analysis {
    pub explanation: String,
    pub plan: String,
}

/// The unit being verified: one file and the failure it should fix.
#[derive(Debug, Clone)]
pub struct VerificationUnit {
    pub issue: Issue,
    /// Repository-relative path of the affected file.
    pub path: String,
    /// Current content of the file, empty if it does not exist yet.
    pub original: String,
    /// Failure context (log excerpt, snippet, feature text).
    pub context: String,
    /// The other files of the same candidate, keyed by path. Checks that
    /// build stage them next to `path`.
    pub companions: BTreeMap<String, String>,
}

/// Result of an independent check on a rewrite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Critique {
    pub ok: bool,
    pub critique: String,
}

impl Critique {
    pub fn pass() -> Self {
        Self {
            ok: true,
            critique: String::new(),
        }
    }

    pub fn fail(critique: impl Into<String>) -> Self {
        Self {
            ok: false,
            critique: critique.into(),
        }
    }
}

/// Produces analyses and full-file rewrites.
#[async_trait]
pub trait Refiner: Send + Sync {
    async fn analyze(&self, unit: &VerificationUnit) -> Result<Analysis, GenerationError>;

    /// Full replacement content for `unit.path` following `plan`.
    async fn rewrite(&self, unit: &VerificationUnit, plan: &str) -> Result<String, GenerationError>;
}

/// Decides whether a rewrite resolves the original failure.
#[async_trait]
pub trait SelfCheck: Send + Sync {
    fn name(&self) -> &str;

    async fn check(
        &self,
        unit: &VerificationUnit,
        candidate: &str,
    ) -> Result<Critique, GenerationError>;
}
