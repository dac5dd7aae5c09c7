//! Remembered fixes and the issue memory.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::issue::{Issue, IssueKind};

/// A fix that previously resolved an issue, kept for reuse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredResolution {
    pub issue_id: String,
    #[serde(default = "default_kind")]
    pub kind: IssueKind,
    pub signature: String,
    /// Path to full file content.
    pub files: BTreeMap<String, String>,
    #[serde(default)]
    pub reuse_count: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_applied_at: Option<DateTime<Utc>>,
    /// Set once the reuse bound is hit; cleared by an operator.
    #[serde(default)]
    pub needs_review: bool,
}

const fn default_kind() -> IssueKind {
    IssueKind::Diagnostic
}

impl StoredResolution {
    pub fn new(issue: &Issue, files: BTreeMap<String, String>) -> Self {
        let now = Utc::now();
        Self {
            issue_id: issue.id.clone(),
            kind: issue.kind,
            signature: issue.signature.clone(),
            files,
            reuse_count: 0,
            created_at: now,
            last_applied_at: Some(now),
            needs_review: false,
        }
    }

    /// Whether another automatic reapplication is allowed under `max_reuse`.
    pub const fn can_reuse(&self, max_reuse: u32) -> bool {
        !self.needs_review && self.reuse_count < max_reuse
    }

    pub fn mark_reused(&mut self) {
        self.reuse_count = self.reuse_count.saturating_add(1);
        self.last_applied_at = Some(Utc::now());
    }
}

/// Persisted `issue id -> resolution` map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IssueMemory {
    entries: BTreeMap<String, StoredResolution>,
}

impl IssueMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, issue_id: &str) -> Option<&StoredResolution> {
        self.entries.get(issue_id)
    }

    pub fn get_mut(&mut self, issue_id: &str) -> Option<&mut StoredResolution> {
        self.entries.get_mut(issue_id)
    }

    /// Insert or replace the resolution for its issue id.
    pub fn remember(&mut self, resolution: StoredResolution) {
        self.entries.insert(resolution.issue_id.clone(), resolution);
    }

    pub fn forget(&mut self, issue_id: &str) -> Option<StoredResolution> {
        self.entries.remove(issue_id)
    }

    /// Look up an entry by full id or unique id prefix.
    pub fn resolve_id(&self, id_or_prefix: &str) -> Option<String> {
        if self.entries.contains_key(id_or_prefix) {
            return Some(id_or_prefix.to_string());
        }
        let mut matches = self
            .entries
            .keys()
            .filter(|id| id.starts_with(id_or_prefix));
        match (matches.next(), matches.next()) {
            (Some(id), None) if !id_or_prefix.is_empty() => Some(id.clone()),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &StoredResolution> {
        self.entries.values()
    }

    pub fn of_kind(&self, kind: IssueKind) -> impl Iterator<Item = &StoredResolution> {
        self.entries.values().filter(move |r| r.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
