//! Issue extraction from build logs and backlog documents.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::domain::models::{canonical_name, Issue, SignalConfig};

fn checkbox_regex() -> &'static Regex {
    static CHECKBOX: OnceLock<Regex> = OnceLock::new();
    CHECKBOX.get_or_init(|| {
        Regex::new(r"^[\s\-\*\d\.\)]*\[\s*\]\s*(.+)$").expect("valid checkbox pattern")
    })
}

fn bullet_regex() -> &'static Regex {
    static BULLET: OnceLock<Regex> = OnceLock::new();
    BULLET.get_or_init(|| {
        Regex::new(r"^\s*(?:[-*+]|\d+[.)])\s+(.+)$").expect("valid bullet pattern")
    })
}

fn checked_regex() -> &'static Regex {
    static CHECKED: OnceLock<Regex> = OnceLock::new();
    CHECKED.get_or_init(|| Regex::new(r"\[[xX]\]").expect("valid checked pattern"))
}

/// Collapse whitespace runs to single spaces and cap the length in characters.
pub fn collapse_signature(text: &str, max_len: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(max_len).collect()
}

struct CompiledSymbolPattern {
    regex: Regex,
    signature: String,
}

/// Turns build/test output into diagnostic issues.
pub struct BuildLogExtractor {
    diagnostic: Regex,
    symbols: Vec<CompiledSymbolPattern>,
    max_signature_len: usize,
}

impl BuildLogExtractor {
    pub fn new(config: &SignalConfig) -> Result<Self, regex::Error> {
        let diagnostic = Regex::new(&config.diagnostic_pattern)?;
        let symbols = config
            .symbol_patterns
            .iter()
            .map(|p| {
                Ok(CompiledSymbolPattern {
                    regex: Regex::new(&p.pattern)?,
                    signature: p.signature.clone(),
                })
            })
            .collect::<Result<Vec<_>, regex::Error>>()?;
        Ok(Self {
            diagnostic,
            symbols,
            max_signature_len: config.max_signature_len,
        })
    }

    fn missing_symbol(&self, line: &str) -> Option<(String, String)> {
        self.symbols.iter().find_map(|p| {
            let name = p.regex.captures(line)?.get(1)?.as_str().to_string();
            Some((p.signature.replace("{name}", &name), name))
        })
    }

    /// Issues in first-occurrence order, one per distinct signature.
    pub fn extract(&self, log: &str) -> Vec<Issue> {
        let mut seen = HashSet::new();
        let mut issues = Vec::new();

        for line in log.lines() {
            let issue = if let Some(caps) = self.diagnostic.captures(line) {
                let whole = caps.get(0).map_or(line, |m| m.as_str());
                let signature = collapse_signature(whole, self.max_signature_len);
                let mut issue = Issue::diagnostic(signature, line.trim());
                if let Some(path) = caps.name("path") {
                    let line_no = caps
                        .name("line")
                        .and_then(|m| m.as_str().parse().ok())
                        .unwrap_or(0);
                    issue = issue.with_location(path.as_str(), line_no);
                }
                if let Some((_, name)) = self.missing_symbol(line) {
                    issue = issue.with_subject_name(name);
                }
                issue
            } else if let Some((signature, name)) = self.missing_symbol(line) {
                Issue::diagnostic(collapse_signature(&signature, self.max_signature_len), line.trim())
                    .with_subject_name(name)
            } else {
                continue;
            };

            if seen.insert(issue.signature.clone()) {
                issues.push(issue);
            }
        }

        issues
    }

    /// Log lines mentioning `path`, capped at `max_chars`.
    pub fn excerpt_for(log: &str, path: &str, max_chars: usize) -> String {
        let mut out = String::new();
        for line in log.lines().filter(|l| l.contains(path)) {
            if out.len() + line.len() + 1 > max_chars {
                break;
            }
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}

/// Turns a backlog document into feature issues.
#[derive(Debug, Clone, Copy, Default)]
pub struct BacklogExtractor;

impl BacklogExtractor {
    /// Unchecked checkbox items; plain bullets when the document has none.
    pub fn extract(text: &str) -> Vec<Issue> {
        let mut titles: Vec<String> = text
            .lines()
            .filter_map(|line| checkbox_regex().captures(line))
            .filter_map(|caps| caps.get(1).map(|m| m.as_str().trim().to_string()))
            .collect();

        let has_any_checkbox = titles.len()
            + text.lines().filter(|l| checked_regex().is_match(l)).count()
            > 0;
        if !has_any_checkbox {
            titles = text
                .lines()
                .filter_map(|line| bullet_regex().captures(line))
                .filter_map(|caps| caps.get(1).map(|m| m.as_str().trim().to_string()))
                .collect();
        }

        let mut seen = HashSet::new();
        titles
            .into_iter()
            .filter(|title| {
                let name = canonical_name(title);
                !name.is_empty() && seen.insert(name)
            })
            .map(Issue::feature)
            .collect()
    }

    /// Tick the first unchecked item titled `title`; `None` if absent.
    pub fn mark_done(text: &str, title: &str) -> Option<String> {
        let mut done = false;
        let mut lines: Vec<String> = Vec::new();
        for line in text.lines() {
            if !done {
                let matches_title = checkbox_regex()
                    .captures(line)
                    .and_then(|caps| caps.get(1))
                    .is_some_and(|m| m.as_str().trim() == title.trim());
                if matches_title {
                    if let (Some(open), Some(close)) = (line.find('['), line.find(']')) {
                        lines.push(format!("{}[x]{}", &line[..open], &line[close + 1..]));
                        done = true;
                        continue;
                    }
                }
            }
            lines.push(line.to_string());
        }

        if !done {
            return None;
        }
        let mut updated = lines.join("\n");
        if text.ends_with('\n') {
            updated.push('\n');
        }
        Some(updated)
    }
}
