//! Deterministic, config-driven templates.

use async_trait::async_trait;
use tracing::debug;

use crate::domain::errors::GenerationError;
use crate::domain::models::{IssueKind, Proposal, TemplateConfig, TemplateTarget};
use crate::domain::ports::{GenerationRequest, Generator};

pub const TEMPLATE_BACKEND: &str = "template";

/// Fills the first template matching the subject; `{name}` is the subject name.
#[derive(Debug, Clone, Default)]
pub struct TemplateGenerator {
    templates: Vec<TemplateConfig>,
    confidence: f64,
}

impl TemplateGenerator {
    pub fn new(templates: Vec<TemplateConfig>, confidence: f64) -> Self {
        Self {
            templates,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

#[async_trait]
impl Generator for TemplateGenerator {
    fn name(&self) -> &str {
        TEMPLATE_BACKEND
    }

    async fn propose(&self, request: &GenerationRequest) -> Result<Proposal, GenerationError> {
        let unsupported = || GenerationError::Unsupported(TEMPLATE_BACKEND.to_string());
        let issue = &request.issue;
        let target = match issue.kind {
            IssueKind::Feature => TemplateTarget::Feature,
            IssueKind::Diagnostic => TemplateTarget::MissingSymbol,
        };
        let name = issue.subject_name.as_deref().filter(|n| !n.is_empty()).ok_or_else(unsupported)?;
        let template = self
            .templates
            .iter()
            .find(|t| t.applies_to == target)
            .ok_or_else(unsupported)?;

        let path = template.path.replace("{name}", name);
        debug!(path = %path, name, "filled template");
        Ok(Proposal::new(TEMPLATE_BACKEND)
            .with_file(path, template.body.replace("{name}", name))
            .with_confidence(self.confidence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Issue;

    fn generator() -> TemplateGenerator {
        TemplateGenerator::new(
            vec![
                TemplateConfig {
                    applies_to: TemplateTarget::MissingSymbol,
                    path: "src/stubs/{name}.rs".to_string(),
                    body: "pub struct {name};\n".to_string(),
                },
                TemplateConfig {
                    applies_to: TemplateTarget::Feature,
                    path: "src/features/{name}.rs".to_string(),
                    body: "// {name}\npub fn run() {}\n".to_string(),
                },
            ],
            0.5,
        )
    }

    #[tokio::test]
    async fn test_missing_symbol_template() {
        let issue = Issue::diagnostic("cannot find Widget in scope", "error").with_subject_name("Widget");
        let proposal = generator()
            .propose(&GenerationRequest::new(issue, ""))
            .await
            .unwrap();
        assert_eq!(proposal.files["src/stubs/Widget.rs"], "pub struct Widget;\n");
        assert_eq!(proposal.confidence, Some(0.5));
    }

    #[tokio::test]
    async fn test_feature_template_uses_canonical_name() {
        let proposal = generator()
            .propose(&GenerationRequest::new(Issue::feature("add export command"), ""))
            .await
            .unwrap();
        assert!(proposal.files.contains_key("src/features/AddExportCommand.rs"));
    }

    #[tokio::test]
    async fn test_unnamed_diagnostic_is_unsupported() {
        let issue = Issue::diagnostic("a.rs:1: error: mismatched types", "error");
        let err = generator()
            .propose(&GenerationRequest::new(issue, ""))
            .await
            .unwrap_err();
        assert_eq!(err, GenerationError::Unsupported("template".to_string()));
    }
}
