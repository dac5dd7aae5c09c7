//! Priority-ordered fallback across generator backends.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::domain::errors::GenerationError;
use crate::domain::models::Proposal;
use crate::domain::ports::{GenerationRequest, Generator};

/// Tries each backend in order; the first non-empty proposal wins.
#[derive(Clone, Default)]
pub struct GeneratorChain {
    backends: Vec<Arc<dyn Generator>>,
}

impl GeneratorChain {
    pub fn new(backends: Vec<Arc<dyn Generator>>) -> Self {
        Self { backends }
    }

    pub fn push(&mut self, backend: Arc<dyn Generator>) {
        self.backends.push(backend);
    }

    pub fn names(&self) -> Vec<String> {
        self.backends.iter().map(|b| b.name().to_string()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

#[async_trait]
impl Generator for GeneratorChain {
    fn name(&self) -> &str {
        "chain"
    }

    async fn propose(&self, request: &GenerationRequest) -> Result<Proposal, GenerationError> {
        let mut failures = Vec::with_capacity(self.backends.len());

        for backend in &self.backends {
            match backend.propose(request).await {
                Ok(mut proposal) if !proposal.is_empty() => {
                    if proposal.backend.is_empty() {
                        proposal.backend = backend.name().to_string();
                    }
                    debug!(backend = backend.name(), pass = request.pass, "backend produced a proposal");
                    return Ok(proposal);
                }
                Ok(_) => {
                    warn!(backend = backend.name(), "backend returned an empty proposal");
                    failures.push(format!("{}: empty proposal", backend.name()));
                }
                Err(GenerationError::Unsupported(name)) => {
                    debug!(backend = %name, "backend does not handle this subject");
                    failures.push(format!("{name}: unsupported"));
                }
                Err(err) => {
                    warn!(backend = backend.name(), error = %err, "backend failed");
                    failures.push(format!("{}: {err}", backend.name()));
                }
            }
        }

        Err(GenerationError::Exhausted(failures))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Issue;

    struct Fixed {
        name: &'static str,
        result: Result<Proposal, GenerationError>,
    }

    #[async_trait]
    impl Generator for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        async fn propose(&self, _request: &GenerationRequest) -> Result<Proposal, GenerationError> {
            self.result.clone()
        }
    }

    fn request() -> GenerationRequest {
        GenerationRequest::new(Issue::diagnostic("boom", "boom"), "ctx")
    }

    #[tokio::test]
    async fn test_first_success_wins() {
        let chain = GeneratorChain::new(vec![
            Arc::new(Fixed {
                name: "template",
                result: Err(GenerationError::Unsupported("template".to_string())),
            }),
            Arc::new(Fixed {
                name: "local_model",
                result: Ok(Proposal::default().with_file("a.rs", "A")),
            }),
            Arc::new(Fixed {
                name: "remote_advisor",
                result: Ok(Proposal::new("remote_advisor").with_file("a.rs", "B")),
            }),
        ]);

        let proposal = chain.propose(&request()).await.unwrap();
        assert_eq!(proposal.files["a.rs"], "A");
        assert_eq!(proposal.backend, "local_model");
    }

    #[tokio::test]
    async fn test_empty_proposal_falls_through() {
        let chain = GeneratorChain::new(vec![
            Arc::new(Fixed {
                name: "local_model",
                result: Ok(Proposal::new("local_model")),
            }),
            Arc::new(Fixed {
                name: "remote_advisor",
                result: Ok(Proposal::new("remote_advisor").with_file("a.rs", "B")),
            }),
        ]);
        let proposal = chain.propose(&request()).await.unwrap();
        assert_eq!(proposal.backend, "remote_advisor");
    }

    #[tokio::test]
    async fn test_all_failures_reported() {
        let chain = GeneratorChain::new(vec![
            Arc::new(Fixed {
                name: "local_model",
                result: Err(GenerationError::Timeout {
                    backend: "local_model".to_string(),
                    secs: 5,
                }),
            }),
            Arc::new(Fixed {
                name: "remote_advisor",
                result: Ok(Proposal::new("remote_advisor")),
            }),
        ]);

        match chain.propose(&request()).await {
            Err(GenerationError::Exhausted(failures)) => {
                assert_eq!(failures.len(), 2);
                assert!(failures[0].starts_with("local_model"));
                assert!(failures[1].contains("empty proposal"));
            }
            other => panic!("expected exhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_chain_is_exhausted() {
        let chain = GeneratorChain::default();
        assert!(chain.is_empty());
        assert_eq!(
            chain.propose(&request()).await,
            Err(GenerationError::Exhausted(vec![]))
        );
    }
}
