//! Detected issues and features.

use serde::{Deserialize, Serialize};

use super::content::sha256_hex;

/// What produced an issue: a build diagnostic or a backlog item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    Diagnostic,
    Feature,
}

impl IssueKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Diagnostic => "diagnostic",
            Self::Feature => "feature",
        }
    }
}

impl std::fmt::Display for IssueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// File and line a diagnostic points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub path: String,
    pub line: u32,
}

/// A normalized representation of a detected failure or gap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// Hash of the signature.
    pub id: String,
    pub kind: IssueKind,
    /// Normalized, fuzzy-matchable text.
    pub signature: String,
    /// Raw excerpt the issue was extracted from.
    pub sample_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
    /// Missing symbol or feature name, when the extractor captured one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_name: Option<String>,
}

impl Issue {
    pub fn new(kind: IssueKind, signature: impl Into<String>, sample_text: impl Into<String>) -> Self {
        let signature = signature.into();
        Self {
            id: issue_id(&signature),
            kind,
            signature,
            sample_text: sample_text.into(),
            location: None,
            subject_name: None,
        }
    }

    pub fn diagnostic(signature: impl Into<String>, sample_text: impl Into<String>) -> Self {
        Self::new(IssueKind::Diagnostic, signature, sample_text)
    }

    pub fn feature(title: impl Into<String>) -> Self {
        let title = title.into();
        let mut issue = Self::new(IssueKind::Feature, title.clone(), title.clone());
        issue.subject_name = Some(canonical_name(&title));
        issue
    }

    #[must_use]
    pub fn with_location(mut self, path: impl Into<String>, line: u32) -> Self {
        self.location = Some(SourceLocation {
            path: path.into(),
            line,
        });
        self
    }

    #[must_use]
    pub fn with_subject_name(mut self, name: impl Into<String>) -> Self {
        self.subject_name = Some(name.into());
        self
    }

    /// First twelve characters of the id, for display.
    pub fn short_id(&self) -> &str {
        short_id(&self.id)
    }
}

/// Identifier derived from a signature.
pub fn issue_id(signature: &str) -> String {
    sha256_hex(signature)
}

pub fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}

/// Upper-camel identifier built from the words of `title`.
///
/// `"add user profile screen"` becomes `"AddUserProfileScreen"`.
pub fn canonical_name(title: &str) -> String {
    title
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars).collect::<String>()
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_id_is_signature_hash() {
        let a = Issue::diagnostic("src/a.rs:1: error: boom", "raw");
        let b = Issue::diagnostic("src/a.rs:1: error: boom", "other raw");
        assert_eq!(a.id, b.id);
        assert_eq!(a.id.len(), 64);
        assert_eq!(a.short_id().len(), 12);
    }

    #[test]
    fn test_feature_issue_gets_canonical_name() {
        let issue = Issue::feature("add user-profile screen");
        assert_eq!(issue.kind, IssueKind::Feature);
        assert_eq!(issue.subject_name.as_deref(), Some("AddUserProfileScreen"));
    }

    #[test]
    fn test_canonical_name_edge_cases() {
        assert_eq!(canonical_name(""), "");
        assert_eq!(canonical_name("  --  "), "");
        assert_eq!(canonical_name("OAuth login"), "OAuthLogin");
    }
}
