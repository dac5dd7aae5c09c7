//! Proposals and candidates.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::confidence::ConfidenceMetrics;

/// Output of one generation pass: path to full candidate content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub files: BTreeMap<String, String>,
    /// Confidence the backend reported for this pass, in [0,1].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Name of the backend that produced the proposal.
    #[serde(default)]
    pub backend: String,
}

impl Proposal {
    pub fn new(backend: impl Into<String>) -> Self {
        Self {
            files: BTreeMap::new(),
            confidence: None,
            backend: backend.into(),
        }
    }

    #[must_use]
    pub fn with_file(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.files.insert(path.into(), content.into());
        self
    }

    #[must_use]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence.clamp(0.0, 1.0));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Where a candidate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateOrigin {
    /// Freshly generated, converged and verified.
    Generated,
    /// Copied from a stored resolution.
    Reused,
}

/// A verified, converged, scored change set ready for the apply state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub issue_id: String,
    pub title: String,
    pub origin: CandidateOrigin,
    pub files: BTreeMap<String, String>,
    pub metrics: ConfidenceMetrics,
    pub score: f64,
}

impl Candidate {
    pub fn paths(&self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }
}
