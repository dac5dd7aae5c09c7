//! Assembles the failure context handed to generators and the verifier.

use crate::domain::models::{Config, Issue, IssueKind};
use crate::services::content_store::ContentStore;
use crate::services::signal_extractor::BuildLogExtractor;

/// Builds generation context and guards protected files.
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    radius: usize,
    excerpt_chars: usize,
    protect_marker: String,
}

impl ContextBuilder {
    pub fn new(radius: usize, excerpt_chars: usize, protect_marker: impl Into<String>) -> Self {
        Self {
            radius,
            excerpt_chars,
            protect_marker: protect_marker.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.signals.context_radius,
            config.signals.excerpt_chars,
            config.protect_marker.clone(),
        )
    }

    /// Whether `content` carries the protect marker.
    pub fn is_protected(&self, content: &str) -> bool {
        !self.protect_marker.is_empty() && content.contains(&self.protect_marker)
    }

    /// Context for `issue`.
    ///
    /// Diagnostics get the log lines mentioning their file and a numbered
    /// snippet around the failing line; features get their backlog text.
    pub fn build(&self, issue: &Issue, log: Option<&str>, store: &ContentStore) -> String {
        if issue.kind == IssueKind::Feature {
            return format!("Feature request: {}\n", issue.sample_text);
        }

        let mut context = format!("Failure: {}\n", issue.signature);
        let Some(location) = &issue.location else {
            if let Some(log) = log {
                context.push_str("\nBuild output:\n");
                context.push_str(&truncate_chars(log, self.excerpt_chars));
            }
            return context;
        };

        if let Some(log) = log {
            let excerpt = BuildLogExtractor::excerpt_for(log, &location.path, self.excerpt_chars);
            if !excerpt.is_empty() {
                context.push_str("\nRelated output:\n");
                context.push_str(&excerpt);
            }
        }

        if let Ok(Some(source)) = store.read_text(&location.path) {
            let snippet = numbered_snippet(&source, location.line as usize, self.radius);
            if !snippet.is_empty() {
                context.push_str(&format!("\n{}:\n", location.path));
                context.push_str(&snippet);
            }
        }
        context
    }
}

/// Lines `line - radius ..= line + radius` (one-based), prefixed with their numbers.
pub fn numbered_snippet(source: &str, line: usize, radius: usize) -> String {
    let lines: Vec<&str> = source.lines().collect();
    if lines.is_empty() || line == 0 {
        return String::new();
    }
    let center = line.min(lines.len());
    let start = center.saturating_sub(radius).max(1);
    let end = (center + radius).min(lines.len());
    let width = end.to_string().len();

    (start..=end)
        .map(|n| {
            let marker = if n == line { ">" } else { " " };
            format!("{marker}{n:>width$} | {}\n", lines[n - 1])
        })
        .collect()
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    // keep the tail; the last lines of a build log carry the failure
    let skip = text.chars().count() - max;
    text.chars().skip(skip).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_numbered_snippet_window() {
        let source = (1..=20).map(|n| format!("line {n}")).collect::<Vec<_>>().join("\n");
        let snippet = numbered_snippet(&source, 10, 2);
        let lines: Vec<&str> = snippet.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], " 8 | line 8");
        assert_eq!(lines[2], ">10 | line 10");
    }

    #[test]
    fn test_numbered_snippet_clamps_at_edges() {
        let snippet = numbered_snippet("a\nb\nc", 1, 8);
        assert_eq!(snippet, ">1 | a\n 2 | b\n 3 | c\n");
        assert!(numbered_snippet("", 3, 2).is_empty());
        assert!(numbered_snippet("a", 0, 2).is_empty());
    }

    #[test]
    fn test_build_includes_excerpt_and_snippet() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("src")).unwrap();
        fs::write(tmp.path().join("src/lib.rs"), "fn a() {}\nfn b() { x }\nfn c() {}\n").unwrap();
        let store = ContentStore::new(tmp.path()).with_durability(false);

        let issue = Issue::diagnostic("src/lib.rs:2: error: cannot find x", "src/lib.rs:2: error")
            .with_location("src/lib.rs", 2);
        let log = "compiling\nsrc/lib.rs:2: error: cannot find x\nother.rs:1: warning: w\n";
        let context = ContextBuilder::new(8, 8000, "// DO NOT MODIFY BY AI").build(&issue, Some(log), &store);

        assert!(context.contains("Failure: src/lib.rs:2"));
        assert!(context.contains("Related output:\nsrc/lib.rs:2: error"));
        assert!(!context.contains("other.rs"));
        assert!(context.contains(">2 | fn b() { x }"));
    }

    #[test]
    fn test_feature_context_is_backlog_text() {
        let tmp = TempDir::new().unwrap();
        let store = ContentStore::new(tmp.path());
        let issue = Issue::feature("add export command");
        let context = ContextBuilder::new(8, 8000, "").build(&issue, None, &store);
        assert_eq!(context, "Feature request: add export command\n");
    }

    #[test]
    fn test_protect_marker() {
        let builder = ContextBuilder::new(8, 8000, "// DO NOT MODIFY BY AI");
        assert!(builder.is_protected("fn a() {}\n// DO NOT MODIFY BY AI\n"));
        assert!(!builder.is_protected("fn a() {}\n"));
        assert!(!ContextBuilder::new(8, 8000, "").is_protected("anything"));
    }
}
