//! Local model backend: a command that reads a prompt on stdin and replies on stdout.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::adapters::process::{run_process, ProcessError, ProcessSpec};
use crate::domain::errors::GenerationError;
use crate::domain::models::LocalModelConfig;
use crate::domain::ports::{ModelClient, ModelRequest};

#[derive(Debug, Clone)]
pub struct CommandModelClient {
    name: String,
    program: String,
    args: Vec<String>,
    working_dir: PathBuf,
    timeout: Duration,
}

impl CommandModelClient {
    pub fn new(name: impl Into<String>, config: &LocalModelConfig, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            program: config.program.clone(),
            args: config.args.clone(),
            working_dir: working_dir.into(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

#[async_trait]
impl ModelClient for CommandModelClient {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self, request), fields(backend = %self.name))]
    async fn complete(&self, request: &ModelRequest) -> Result<String, GenerationError> {
        let input = if request.system.is_empty() {
            request.prompt.clone()
        } else {
            format!("{}\n\n{}", request.system, request.prompt)
        };

        let output = run_process(ProcessSpec {
            program: &self.program,
            args: &self.args,
            working_dir: &self.working_dir,
            stdin: Some(&input),
            timeout: self.timeout,
        })
        .await
        .map_err(|err| match err {
            ProcessError::Timeout { timeout, .. } => GenerationError::Timeout {
                backend: self.name.clone(),
                secs: timeout.as_secs(),
            },
            other => GenerationError::Backend {
                backend: self.name.clone(),
                message: other.to_string(),
            },
        })?;

        if !output.success {
            return Err(GenerationError::Backend {
                backend: self.name.clone(),
                message: format!(
                    "exited with {}: {}",
                    output.code.map_or_else(|| "signal".to_string(), |c| c.to_string()),
                    output.stderr.trim()
                ),
            });
        }
        debug!(bytes = output.stdout.len(), "model replied");
        Ok(output.stdout)
    }
}
