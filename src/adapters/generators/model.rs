//! Model-backed generator shared by the local model and the remote advisor.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::adapters::models::reply::{extract_json_object, strip_code_fence};
use crate::domain::errors::GenerationError;
use crate::domain::models::{Issue, IssueKind, Proposal};
use crate::domain::ports::{GenerationRequest, Generator, ModelClient, ModelRequest};
use crate::services::content_store::ContentStore;

const SYSTEM_PROMPT: &str = "You are a careful software engineer. Keep changes minimal and \
do not rewrite unrelated code. Reply with ONLY a JSON object of the form \
{\"files\": {\"<relative path>\": \"<full new file content>\"}, \"confidence\": <number between 0 and 1>}.";

/// Cap on how much of the current file goes into a prompt.
const MAX_FILE_CHARS: usize = 16_000;

/// `min(0.95, 0.2 + min(0.75, len / 5000))`: longer replies earn more trust, up to a point.
pub fn length_confidence(len: usize) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let scaled = len as f64 / 5000.0;
    (0.2 + scaled.min(0.75)).min(0.95)
}

/// Turn a model reply into a proposal.
///
/// Prefers a JSON object with a `files` map; a bare reply is taken as the
/// full replacement for the issue's file when the issue has a location.
pub fn parse_proposal(backend: &str, issue: &Issue, reply: &str) -> Result<Proposal, GenerationError> {
    if let Some(object) = extract_json_object(reply) {
        if let Some(Value::Object(files)) = object.get("files") {
            let files: BTreeMap<String, String> = files
                .iter()
                .filter_map(|(path, content)| content.as_str().map(|c| (path.clone(), c.to_string())))
                .filter(|(path, content)| !path.trim().is_empty() && !content.trim().is_empty())
                .collect();
            if files.is_empty() {
                return Err(GenerationError::EmptyProposal(backend.to_string()));
            }
            let confidence = object
                .get("confidence")
                .and_then(Value::as_f64)
                .unwrap_or_else(|| length_confidence(files.values().map(String::len).sum()));
            return Ok(Proposal {
                files,
                confidence: None,
                backend: backend.to_string(),
            }
            .with_confidence(confidence));
        }
    }

    let Some(location) = &issue.location else {
        return Err(GenerationError::Unparseable {
            backend: backend.to_string(),
            message: "reply has no files object and the issue has no file".to_string(),
        });
    };
    let content = strip_code_fence(reply);
    if content.is_empty() {
        return Err(GenerationError::EmptyProposal(backend.to_string()));
    }
    let confidence = length_confidence(content.len());
    Ok(Proposal::new(backend)
        .with_file(location.path.clone(), content)
        .with_confidence(confidence))
}

/// Prompts a [`ModelClient`] for full-file proposals.
pub struct ModelGenerator {
    name: String,
    client: Arc<dyn ModelClient>,
    store: ContentStore,
}

impl ModelGenerator {
    pub fn new(name: impl Into<String>, client: Arc<dyn ModelClient>, store: ContentStore) -> Self {
        Self {
            name: name.into(),
            client,
            store,
        }
    }

    fn prompt(&self, request: &GenerationRequest) -> String {
        let issue = &request.issue;
        let mut prompt = match issue.kind {
            IssueKind::Diagnostic => format!(
                "Fix this build failure.\n\nFailure:\n---\n{}\n---\n\nContext:\n---\n{}\n---\n",
                issue.sample_text, request.context
            ),
            IssueKind::Feature => format!(
                "Implement this backlog item.\n\nItem: {}\nSuggested name: {}\n\nContext:\n---\n{}\n---\n",
                issue.sample_text,
                issue.subject_name.as_deref().unwrap_or_default(),
                request.context
            ),
        };

        if let Some(location) = &issue.location {
            if let Ok(Some(current)) = self.store.read_text(&location.path) {
                let current: String = current.chars().take(MAX_FILE_CHARS).collect();
                prompt.push_str(&format!("\nCurrent {}:\n---\n{current}\n---\n", location.path));
            }
        }

        if let Some(previous) = &request.previous {
            prompt.push_str(&format!(
                "\nPass {} of a stability check. Previous pass proposed:\n",
                request.pass
            ));
            for (path, content) in &previous.files {
                prompt.push_str(&format!("--- {path}\n{content}\n"));
            }
            prompt.push_str("Return the same files unchanged unless they are wrong.\n");
        }
        prompt
    }
}

#[async_trait]
impl Generator for ModelGenerator {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self, request), fields(backend = %self.name, pass = request.pass))]
    async fn propose(&self, request: &GenerationRequest) -> Result<Proposal, GenerationError> {
        let reply = self
            .client
            .complete(&ModelRequest::new(SYSTEM_PROMPT, self.prompt(request)))
            .await?;
        let proposal = parse_proposal(&self.name, &request.issue, &reply)?;
        debug!(files = proposal.files.len(), confidence = ?proposal.confidence, "parsed proposal");
        Ok(proposal)
    }
}
