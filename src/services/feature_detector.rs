//! Looks for a backlog item that is already implemented before spending
//! generation passes on it.
//!
//! Evidence, strongest first:
//! - a file named after the feature (`AddExport.swift`, `add_export.rs`)
//! - a type or function declared under the feature's name
//! - enough of the title's significant words in one file

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Serialize;
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::domain::models::Issue;
use crate::services::confidence_scorer::{MAX_SCAN_BYTES, SKIPPED_DIRS};

/// Words shorter than this never count as feature tokens.
const MIN_TOKEN_LEN: usize = 4;
/// Only the first few significant words of a title are matched.
const MAX_TOKENS: usize = 3;

const DECLARATION_KEYWORDS: &str = "struct|class|enum|trait|fn|def|func|interface|protocol|type|mod";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Evidence {
    FileName,
    Declaration,
    Tokens { matched: usize },
}

impl fmt::Display for Evidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FileName => write!(f, "file name"),
            Self::Declaration => write!(f, "declaration"),
            Self::Tokens { matched } => write!(f, "{matched} title words"),
        }
    }
}

/// Where a feature was found and why it counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresentFeature {
    pub path: String,
    pub evidence: Evidence,
}

#[derive(Debug, Clone)]
pub struct FeatureDetector {
    state_dir_name: String,
    min_token_matches: usize,
}

impl FeatureDetector {
    pub fn new(state_dir: &str, min_token_matches: usize) -> Self {
        let state_dir_name = Path::new(state_dir)
            .file_name()
            .map_or_else(|| state_dir.to_string(), |n| n.to_string_lossy().into_owned());
        Self {
            state_dir_name,
            min_token_matches: min_token_matches.max(1),
        }
    }

    fn is_skipped(&self, entry: &DirEntry) -> bool {
        entry.depth() > 0
            && entry.file_type().is_dir()
            && entry
                .file_name()
                .to_str()
                .is_some_and(|name| name == self.state_dir_name || SKIPPED_DIRS.contains(&name))
    }

    /// Search `root` for `issue`, ignoring the `excluded` paths (the backlog
    /// documents, which always mention it). Only feature issues with a
    /// canonical name are searched.
    pub fn detect(&self, root: &Path, issue: &Issue, excluded: &[&str]) -> Option<PresentFeature> {
        let canonical = issue.subject_name.as_deref().filter(|n| !n.is_empty())?;
        let snake = snake_name(&issue.sample_text);
        let tokens = feature_tokens(&issue.sample_text);
        let declaration = declaration_regex(canonical, &snake);
        let excluded: Vec<PathBuf> = excluded.iter().map(|p| root.join(p)).collect();

        let mut best: Option<PresentFeature> = None;
        for entry in WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !self.is_skipped(e))
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
        {
            if excluded.iter().any(|p| p == entry.path()) {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(root)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .replace('\\', "/");

            let stem = entry
                .path()
                .file_stem()
                .map(|s| s.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            if stem == canonical.to_lowercase() || stem == snake {
                debug!(path = %relative, feature = canonical, "feature file exists");
                return Some(PresentFeature {
                    path: relative,
                    evidence: Evidence::FileName,
                });
            }

            if !entry.metadata().is_ok_and(|m| m.len() <= MAX_SCAN_BYTES) {
                continue;
            }
            let Ok(text) = fs::read_to_string(entry.path()) else {
                continue;
            };
            if declaration.as_ref().is_some_and(|re| re.is_match(&text)) {
                best = Some(PresentFeature {
                    path: relative,
                    evidence: Evidence::Declaration,
                });
                continue;
            }
            if best.is_some() || tokens.len() < self.min_token_matches {
                continue;
            }
            let lowered = text.to_lowercase();
            let matched = tokens.iter().filter(|t| lowered.contains(t.as_str())).count();
            if matched >= self.min_token_matches {
                best = Some(PresentFeature {
                    path: relative,
                    evidence: Evidence::Tokens { matched },
                });
            }
        }
        if let Some(found) = &best {
            debug!(path = %found.path, evidence = %found.evidence, feature = canonical, "feature already present");
        }
        best
    }
}

/// Lowercase words of `title` joined by underscores.
pub fn snake_name(title: &str) -> String {
    title
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("_")
}

/// First few distinct lowercase words of at least four characters.
pub fn feature_tokens(title: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    for word in title.split(|c: char| !c.is_alphanumeric()) {
        let word = word.to_lowercase();
        if word.chars().count() >= MIN_TOKEN_LEN && !tokens.contains(&word) {
            tokens.push(word);
        }
        if tokens.len() == MAX_TOKENS {
            break;
        }
    }
    tokens
}

fn declaration_regex(canonical: &str, snake: &str) -> Option<Regex> {
    let mut names = vec![regex::escape(canonical)];
    if !snake.is_empty() && snake != canonical {
        names.push(regex::escape(snake));
    }
    Regex::new(&format!(r"\b(?:{DECLARATION_KEYWORDS})\s+(?:{})\b", names.join("|"))).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn repo(files: &[(&str, &str)]) -> TempDir {
        let tmp = TempDir::new().unwrap();
        for (path, content) in files {
            let target = tmp.path().join(path);
            fs::create_dir_all(target.parent().unwrap()).unwrap();
            fs::write(target, content).unwrap();
        }
        tmp
    }

    fn detector() -> FeatureDetector {
        FeatureDetector::new(".mender", 3)
    }

    #[test]
    fn test_names_and_tokens() {
        assert_eq!(snake_name("Add export-command"), "add_export_command");
        assert_eq!(feature_tokens("Add CSV export to the export page quickly"), vec!["export", "page", "quickly"]);
        assert!(feature_tokens("Fix UI").is_empty());
    }

    #[test]
    fn test_file_named_after_feature() {
        let tmp = repo(&[("App/Features/UserProfile.swift", "import SwiftUI\n")]);
        let found = detector()
            .detect(tmp.path(), &Issue::feature("User profile"), &[])
            .unwrap();
        assert_eq!(found.path, "App/Features/UserProfile.swift");
        assert_eq!(found.evidence, Evidence::FileName);

        let tmp = repo(&[("src/user_profile.rs", "")]);
        let found = detector().detect(tmp.path(), &Issue::feature("User profile"), &[]);
        assert_eq!(found.map(|f| f.evidence), Some(Evidence::FileName));
    }

    #[test]
    fn test_declaration_under_feature_name() {
        let tmp = repo(&[
            ("src/lib.rs", "pub mod commands;\n"),
            ("src/commands.rs", "pub fn export_csv(rows: &[Row]) {}\n"),
        ]);
        let found = detector()
            .detect(tmp.path(), &Issue::feature("Export CSV"), &[])
            .unwrap();
        assert_eq!(found.path, "src/commands.rs");
        assert_eq!(found.evidence, Evidence::Declaration);
    }

    #[test]
    fn test_title_words_must_co_occur() {
        let issue = Issue::feature("Offline sync queue for uploads");
        let scattered = repo(&[("a.rs", "// offline mode\n"), ("b.rs", "// sync queue\n")]);
        assert!(detector().detect(scattered.path(), &issue, &[]).is_none());

        let together = repo(&[("src/net.rs", "/// Offline uploads wait in a Sync queue.\n")]);
        let found = detector().detect(together.path(), &issue, &[]).unwrap();
        assert_eq!(found.evidence, Evidence::Tokens { matched: 3 });
    }

    #[test]
    fn test_backlog_and_state_are_ignored() {
        let issue = Issue::feature("Offline sync queue for uploads");
        let tmp = repo(&[
            ("need_work.md", "- [ ] Offline sync queue for uploads\n"),
            (".mender/state.json", "{\"title\": \"Offline sync queue for uploads\"}"),
            ("target/debug/OfflineSyncQueueForUploads", ""),
        ]);
        assert!(detector().detect(tmp.path(), &issue, &["need_work.md"]).is_none());
    }

    #[test]
    fn test_short_titles_need_stronger_evidence() {
        // two significant words never reach three token matches
        let tmp = repo(&[("src/main.rs", "#[command(about = \"export data\")]\n")]);
        assert!(detector()
            .detect(tmp.path(), &Issue::feature("Add export command"), &[])
            .is_none());
    }
}
