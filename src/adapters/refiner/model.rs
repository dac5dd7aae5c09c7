//! Model-backed analysis, rewrite and critique.

use std::sync::Arc;
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::adapters::models::reply::{extract_json_object, string_or_list, strip_code_fence};
use crate::domain::errors::GenerationError;
use crate::domain::ports::{
    Analysis, Critique, ModelClient, ModelRequest, Refiner, SelfCheck, VerificationUnit,
};

const EXCERPT_CHARS: usize = 8000;

const ANALYSIS_SYSTEM: &str = "You are a build failure analyst. Be concise and precise.";
const REWRITE_SYSTEM: &str = "You are a careful refactoring assistant. Keep changes minimal.";
const CHECK_SYSTEM: &str = "You are a build verifier. Be direct and accurate.";

fn enumerated_regex() -> &'static Regex {
    static ENUMERATED: OnceLock<Regex> = OnceLock::new();
    ENUMERATED.get_or_init(|| Regex::new(r"^(?:\d+[.)]|[-*])\s+(.+)$").expect("valid list pattern"))
}

fn approval_regex() -> &'static Regex {
    static APPROVAL: OnceLock<Regex> = OnceLock::new();
    APPROVAL.get_or_init(|| {
        Regex::new(r"(?i)\b(true|ok|resolved|likely resolved|should fix)\b").expect("valid approval pattern")
    })
}

fn truncate(text: &str) -> String {
    text.chars().take(EXCERPT_CHARS).collect()
}

/// Analysis from a reply: JSON `{explanation, plan}` or an enumerated list.
fn parse_analysis(reply: &str) -> Analysis {
    if let Some(object) = extract_json_object(reply) {
        let explanation = object
            .get("explanation")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let plan = string_or_list(object.get("plan"))
            .map(|plan| plan.lines().map(|step| format!("- {step}")).collect::<Vec<_>>().join("\n"))
            .unwrap_or_default();
        if !plan.is_empty() {
            return Analysis { explanation, plan };
        }
    }

    let lines: Vec<&str> = reply.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    let steps: Vec<String> = lines
        .iter()
        .filter_map(|line| enumerated_regex().captures(line))
        .filter_map(|caps| caps.get(1).map(|m| format!("- {}", m.as_str())))
        .collect();
    let plan = if steps.is_empty() {
        reply.trim().to_string()
    } else {
        steps.join("\n")
    };
    Analysis {
        explanation: lines.iter().take(3).copied().collect::<Vec<_>>().join("\n"),
        plan,
    }
}

/// Critique from a reply: JSON `{ok, critique|explanation}`, else keyword heuristics.
fn parse_critique(reply: &str) -> Critique {
    if let Some(object) = extract_json_object(reply) {
        if let Some(ok) = object.get("ok").and_then(Value::as_bool) {
            let critique = ["critique", "explanation"]
                .iter()
                .find_map(|key| object.get(*key).and_then(Value::as_str))
                .unwrap_or_default()
                .to_string();
            return Critique { ok, critique };
        }
    }
    Critique {
        ok: approval_regex().is_match(reply),
        critique: reply.trim().to_string(),
    }
}

/// Analysis and rewrite through a model client.
pub struct ModelRefiner {
    client: Arc<dyn ModelClient>,
}

impl ModelRefiner {
    pub fn new(client: Arc<dyn ModelClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Refiner for ModelRefiner {
    async fn analyze(&self, unit: &VerificationUnit) -> Result<Analysis, GenerationError> {
        let prompt = format!(
            "Task:\n  1) Read the failure and the file context.\n  2) Identify the likely root cause.\n  \
             3) Produce a concise, ordered plan of changes.\n\n\
             Return ONLY a JSON object: {{\"explanation\": string, \"plan\": [string, ...]}}\n\n\
             Failure:\n---\n{}\n---\n\nContext:\n---\n{}\n---\n\nFile {} (truncated):\n---\n{}\n---\n",
            truncate(&unit.issue.sample_text),
            truncate(&unit.context),
            unit.path,
            truncate(&unit.original),
        );
        let reply = self.client.complete(&ModelRequest::new(ANALYSIS_SYSTEM, prompt)).await?;
        let analysis = parse_analysis(&reply);
        debug!(plan_len = analysis.plan.len(), "analysis parsed");
        Ok(analysis)
    }

    async fn rewrite(&self, unit: &VerificationUnit, plan: &str) -> Result<String, GenerationError> {
        let prompt = format!(
            "Apply this plan to the file. Output ONLY the full corrected contents of {} and NOTHING else.\n\n\
             Plan:\n{plan}\n\nOriginal file:\n---\n{}\n---\n\n\
             Requirements:\n - Preserve license headers and top-of-file comments.\n - Prefer minimal diffs.\n",
            unit.path, unit.original,
        );
        let reply = self.client.complete(&ModelRequest::new(REWRITE_SYSTEM, prompt)).await?;
        Ok(strip_code_fence(&reply))
    }
}

/// Independent model critique of a candidate.
pub struct ModelSelfCheck {
    client: Arc<dyn ModelClient>,
}

impl ModelSelfCheck {
    pub fn new(client: Arc<dyn ModelClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SelfCheck for ModelSelfCheck {
    fn name(&self) -> &str {
        "model"
    }

    async fn check(&self, unit: &VerificationUnit, candidate: &str) -> Result<Critique, GenerationError> {
        let prompt = format!(
            "Given this failure and a candidate replacement for {}, determine whether the failure would be resolved.\n\
             Return ONLY a JSON object: {{\"ok\": true|false, \"critique\": \"...\"}}\n\n\
             Failure:\n---\n{}\n---\n\nCandidate (truncated):\n---\n{}\n---\n",
            unit.path,
            truncate(&unit.issue.sample_text),
            truncate(candidate),
        );
        let reply = self.client.complete(&ModelRequest::new(CHECK_SYSTEM, prompt)).await?;
        Ok(parse_critique(&reply))
    }
}
