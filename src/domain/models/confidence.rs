//! Inputs to the confidence score.

use serde::{Deserialize, Serialize};

/// Evidence gathered for one candidate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceMetrics {
    /// Other files referencing the changed units.
    pub call_site_evidence: u32,
    /// Backend-reported confidence in [0,1].
    pub self_reported_confidence: f64,
    /// Files of the candidate whose exact content already failed a post-apply test.
    pub test_impact: u32,
}

impl ConfidenceMetrics {
    pub const fn new(call_site_evidence: u32, self_reported_confidence: f64, test_impact: u32) -> Self {
        Self {
            call_site_evidence,
            self_reported_confidence,
            test_impact,
        }
    }
}
