//! Persisted run state.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::content::ContentLedger;
use super::resolution::IssueMemory;

/// Identifiers of items already handled; cleared by a forced run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessedSet {
    items: BTreeSet<String>,
}

impl ProcessedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.items.contains(id)
    }

    pub fn insert(&mut self, id: impl Into<String>) -> bool {
        self.items.insert(id.into())
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// What happened the last time a candidate was produced for one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// Normalized hash of the last verified candidate.
    pub last_hash: String,
    pub updated_at: DateTime<Utc>,
    /// Normalized hashes of candidates for this unit that failed the
    /// post-apply test.
    #[serde(default)]
    pub failed_hashes: BTreeSet<String>,
}

/// Per-unit history backing the duplicate-output guard and test impact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttemptCache {
    units: BTreeMap<String, AttemptRecord>,
}

impl AttemptCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, unit: &str) -> Option<&AttemptRecord> {
        self.units.get(unit)
    }

    pub fn last_hash(&self, unit: &str) -> Option<&str> {
        self.units.get(unit).map(|r| r.last_hash.as_str())
    }

    pub fn record_hash(&mut self, unit: impl Into<String>, hash: impl Into<String>) {
        let hash = hash.into();
        let now = Utc::now();
        self.units
            .entry(unit.into())
            .and_modify(|r| {
                r.last_hash.clone_from(&hash);
                r.updated_at = now;
            })
            .or_insert_with(|| AttemptRecord {
                last_hash: hash.clone(),
                updated_at: now,
                failed_hashes: BTreeSet::new(),
            });
    }

    /// Remember that the content hashing to `hash` broke the tests for `unit`.
    pub fn record_regression(&mut self, unit: impl Into<String>, hash: impl Into<String>) {
        let hash = hash.into();
        let now = Utc::now();
        let record = self.units.entry(unit.into()).or_insert_with(|| AttemptRecord {
            last_hash: hash.clone(),
            updated_at: now,
            failed_hashes: BTreeSet::new(),
        });
        record.failed_hashes.insert(hash);
        record.updated_at = now;
    }

    /// Whether this exact content already failed the post-apply test.
    pub fn is_known_regression(&self, unit: &str, hash: &str) -> bool {
        self.units.get(unit).is_some_and(|r| r.failed_hashes.contains(hash))
    }

    /// Distinct candidates for `unit` that failed the post-apply test.
    pub fn regressions(&self, unit: &str) -> u32 {
        self.units
            .get(unit)
            .map_or(0, |r| u32::try_from(r.failed_hashes.len()).unwrap_or(u32::MAX))
    }
}

/// Everything loaded at run start and written back at run end.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunState {
    pub issues: IssueMemory,
    pub ledger: ContentLedger,
    pub processed: ProcessedSet,
    pub attempts: AttemptCache,
}
