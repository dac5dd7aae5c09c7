//! Fuzzy matching of issue signatures against remembered resolutions.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use tracing::info;

use crate::domain::models::{Issue, IssueKind, IssueMemory, StoredResolution};

fn word_regex() -> &'static Regex {
    static WORD: OnceLock<Regex> = OnceLock::new();
    WORD.get_or_init(|| Regex::new(r"\w+").expect("valid word pattern"))
}

/// Case-insensitive word set of `text`.
pub fn tokenize(text: &str) -> BTreeSet<String> {
    word_regex()
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// `|A ∩ B| / min(|A|, |B|)` over word sets; zero if either set is empty.
pub fn token_overlap(a: &str, b: &str) -> f64 {
    let left = tokenize(a);
    let right = tokenize(b);
    let smaller = left.len().min(right.len());
    if smaller == 0 {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let ratio = left.intersection(&right).count() as f64 / smaller as f64;
    ratio
}

/// Signature comparison rules.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignatureMatcher {
    overlap_threshold: f64,
}

impl Default for SignatureMatcher {
    fn default() -> Self {
        Self::new(0.5)
    }
}

/// Outcome of reconciling current issues with memory.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MatchReport {
    /// Current issue id to the remembered resolution it matched.
    pub matched: BTreeMap<String, StoredResolution>,
    /// Remembered resolutions no current issue matched; removed from memory.
    pub forgotten: Vec<StoredResolution>,
}

impl SignatureMatcher {
    pub const fn new(overlap_threshold: f64) -> Self {
        Self { overlap_threshold }
    }

    /// Symmetric fuzzy equality of two signatures.
    ///
    /// Either contains the other, or their word overlap reaches the
    /// threshold. An empty signature matches nothing.
    pub fn same_signature(&self, a: &str, b: &str) -> bool {
        if a.is_empty() || b.is_empty() {
            return false;
        }
        if a.contains(b) || b.contains(a) {
            return true;
        }
        token_overlap(a, b) >= self.overlap_threshold
    }

    /// Pair each current issue with a remembered resolution of the same kind
    /// and forget remembered resolutions that no longer match anything.
    ///
    /// Entries of other kinds are left alone.
    pub fn reconcile(&self, kind: IssueKind, current: &[Issue], memory: &mut IssueMemory) -> MatchReport {
        let mut report = MatchReport::default();
        let mut still_present: BTreeSet<String> = BTreeSet::new();

        for stored in memory.of_kind(kind) {
            let mut hit = false;
            for issue in current.iter().filter(|i| i.kind == kind) {
                if !self.same_signature(&issue.signature, &stored.signature) {
                    continue;
                }
                hit = true;
                report
                    .matched
                    .entry(issue.id.clone())
                    .or_insert_with(|| stored.clone());
            }
            if hit {
                still_present.insert(stored.issue_id.clone());
            }
        }

        let stale: Vec<String> = memory
            .of_kind(kind)
            .filter(|r| !still_present.contains(&r.issue_id))
            .map(|r| r.issue_id.clone())
            .collect();
        for id in stale {
            if let Some(resolution) = memory.forget(&id) {
                info!(issue_id = %id, signature = %resolution.signature, "forgetting resolved issue");
                report.forgotten.push(resolution);
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn remembered(memory: &mut IssueMemory, issue: &Issue) {
        memory.remember(StoredResolution::new(
            issue,
            BTreeMap::from([("a.rs".to_string(), "fixed\n".to_string())]),
        ));
    }

    #[test]
    fn test_token_overlap() {
        assert!((token_overlap("cannot find Foo in scope", "CANNOT find foo") - 1.0).abs() < f64::EPSILON);
        assert!((token_overlap("a b c d", "a b x y") - 0.5).abs() < f64::EPSILON);
        assert!(token_overlap("", "a").abs() < f64::EPSILON);
        assert!(token_overlap("!!!", "???").abs() < f64::EPSILON);
    }

    #[test]
    fn test_mixed_case_comparison_is_symmetric() {
        let matcher = SignatureMatcher::new(0.5);
        let pairs = [("Cannot Find Foo", "cannot"), ("E0425: Foo.bar", "e0425 foo"), ("A", "a b c")];
        for (a, b) in pairs {
            assert_eq!(matcher.same_signature(a, b), matcher.same_signature(b, a), "{a} vs {b}");
        }
        assert!(matcher.same_signature("E0425: Foo.bar", "e0425 foo"));
    }

    #[test]
    fn test_same_signature_containment() {
        let m = SignatureMatcher::default();
        assert!(m.same_signature("src/a.rs:10: error: boom", "error: boom"));
        assert!(m.same_signature("error: boom", "src/a.rs:10: error: boom"));
    }

    #[test]
    fn test_same_signature_overlap() {
        let m = SignatureMatcher::default();
        assert!(m.same_signature(
            "src/a.rs:10: error: mismatched types expected u32",
            "src/a.rs:12: error: mismatched types expected i64"
        ));
        assert!(!m.same_signature("linker failed for target", "missing semicolon in expression"));
    }

    #[test]
    fn test_empty_never_matches() {
        let m = SignatureMatcher::default();
        assert!(!m.same_signature("", ""));
        assert!(!m.same_signature("", "boom"));
        assert!(!m.same_signature("boom", ""));
    }

    #[test]
    fn test_reconcile_matches_and_forgets() {
        let m = SignatureMatcher::default();
        let mut memory = IssueMemory::new();
        let old_fixed = Issue::diagnostic("src/a.rs:3: error: cannot borrow x as mutable", "");
        let gone = Issue::diagnostic("src/b.rs:9: error: unresolved import foo", "");
        remembered(&mut memory, &old_fixed);
        remembered(&mut memory, &gone);

        let current = vec![Issue::diagnostic("src/a.rs:4: error: cannot borrow x as mutable", "")];
        let report = m.reconcile(IssueKind::Diagnostic, &current, &mut memory);

        assert_eq!(report.matched.len(), 1);
        assert_eq!(report.matched[&current[0].id].issue_id, old_fixed.id);
        assert_eq!(report.forgotten.len(), 1);
        assert_eq!(report.forgotten[0].issue_id, gone.id);
        assert!(memory.get(&gone.id).is_none());
        assert!(memory.get(&old_fixed.id).is_some());
    }

    #[test]
    fn test_reconcile_leaves_other_kinds_alone() {
        let m = SignatureMatcher::default();
        let mut memory = IssueMemory::new();
        let feature = Issue::feature("add settings screen");
        remembered(&mut memory, &feature);

        let report = m.reconcile(IssueKind::Diagnostic, &[], &mut memory);
        assert!(report.forgotten.is_empty());
        assert_eq!(memory.len(), 1);
    }
}
