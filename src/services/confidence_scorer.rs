//! Confidence scoring and evidence gathering.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use walkdir::{DirEntry, WalkDir};

use crate::domain::models::{content_hash, AttemptCache, ConfidenceMetrics};

const CALL_SITE_WEIGHT: f64 = 0.05;
const CALL_SITE_CAP: f64 = 0.4;
const SELF_REPORT_WEIGHT: f64 = 0.5;
const SELF_REPORT_CAP: f64 = 0.5;
const TEST_IMPACT_PENALTY: f64 = 0.3;

/// Directories never scanned for call-site evidence.
pub(crate) const SKIPPED_DIRS: &[&str] = &[".git", "target", "node_modules", ".build", "build", "dist"];

/// Files larger than this are not scanned.
pub(crate) const MAX_SCAN_BYTES: u64 = 1024 * 1024;

/// `min(0.4, 0.05 * callSites) + min(0.5, 0.5 * confidence)`, times 0.3
/// when the candidate is known to break tests, clamped to [0,1].
pub fn score(metrics: &ConfidenceMetrics) -> f64 {
    let call_sites = (CALL_SITE_WEIGHT * f64::from(metrics.call_site_evidence)).min(CALL_SITE_CAP);
    let reported = (metrics.self_reported_confidence * SELF_REPORT_WEIGHT).min(SELF_REPORT_CAP);
    let mut total = call_sites + reported;
    if metrics.test_impact > 0 {
        total *= TEST_IMPACT_PENALTY;
    }
    total.clamp(0.0, 1.0)
}

/// Gathers the inputs for [`score`] from the repository and attempt history.
#[derive(Debug, Clone)]
pub struct EvidenceCollector {
    state_dir_name: String,
}

impl EvidenceCollector {
    pub fn new(state_dir: &str) -> Self {
        let state_dir_name = Path::new(state_dir)
            .file_name()
            .map_or_else(|| state_dir.to_string(), |n| n.to_string_lossy().into_owned());
        Self { state_dir_name }
    }

    fn is_skipped(&self, entry: &DirEntry) -> bool {
        entry.depth() > 0
            && entry.file_type().is_dir()
            && entry
                .file_name()
                .to_str()
                .is_some_and(|name| name == self.state_dir_name || SKIPPED_DIRS.contains(&name))
    }

    /// Count files under `root`, other than the changed ones, that mention the
    /// stem of any changed file.
    pub fn call_site_evidence(&self, root: &Path, changed: &[String]) -> u32 {
        let stems: Vec<String> = changed
            .iter()
            .filter_map(|p| Path::new(p).file_stem())
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| s.len() >= 3)
            .collect();
        if stems.is_empty() {
            return 0;
        }

        let changed_abs: Vec<_> = changed.iter().map(|p| root.join(p)).collect();
        let mut count = 0u32;
        for entry in WalkDir::new(root)
            .into_iter()
            .filter_entry(|e| !self.is_skipped(e))
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
        {
            if changed_abs.iter().any(|c| c == entry.path()) {
                continue;
            }
            if !entry.metadata().is_ok_and(|m| m.len() <= MAX_SCAN_BYTES) {
                continue;
            }
            let Ok(text) = fs::read_to_string(entry.path()) else {
                continue;
            };
            if stems.iter().any(|stem| text.contains(stem.as_str())) {
                count = count.saturating_add(1);
            }
        }
        count
    }

    /// Files of the candidate whose exact content already failed the
    /// post-apply test. Earlier failures of different content do not count.
    pub fn test_impact(attempts: &AttemptCache, files: &BTreeMap<String, String>) -> u32 {
        let known = files
            .iter()
            .filter(|(path, content)| attempts.is_known_regression(path, &content_hash(content)))
            .count();
        u32::try_from(known).unwrap_or(u32::MAX)
    }

    pub fn collect(
        &self,
        root: &Path,
        files: &BTreeMap<String, String>,
        self_reported_confidence: f64,
        attempts: &AttemptCache,
    ) -> ConfidenceMetrics {
        let changed: Vec<String> = files.keys().cloned().collect();
        ConfidenceMetrics::new(
            self.call_site_evidence(root, &changed),
            self_reported_confidence.clamp(0.0, 1.0),
            Self::test_impact(attempts, files),
        )
    }
}
