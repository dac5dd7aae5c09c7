//! Self-check by building: stage the candidate, run the build, restore.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::domain::errors::GenerationError;
use crate::domain::models::normalize_text;
use crate::domain::ports::{BuildRunner, BuildSpec, Critique, SelfCheck, VerificationUnit};
use crate::services::content_store::{atomic_write, is_suspicious_target, ContentStore};

const CRITIQUE_TAIL_LINES: usize = 40;

struct StagedFile {
    path: String,
    absolute: PathBuf,
    prior: Option<Vec<u8>>,
}

/// Judges a candidate by whether the build passes with it, and the rest of
/// its candidate, in place.
///
/// The original bytes are always put back, whatever the build does.
pub struct BuildSelfCheck {
    store: ContentStore,
    runner: Arc<dyn BuildRunner>,
    spec: BuildSpec,
    dry_run: bool,
}

impl BuildSelfCheck {
    pub fn new(store: ContentStore, runner: Arc<dyn BuildRunner>, spec: BuildSpec) -> Self {
        Self {
            store,
            runner,
            spec,
            dry_run: false,
        }
    }

    /// In a dry run nothing is staged and candidates are accepted unbuilt.
    #[must_use]
    pub const fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Write `content` over `path`, returning what was there before.
    fn stage(&self, path: &str, content: &str) -> Result<StagedFile, GenerationError> {
        let (_, absolute) = self.store.resolve(path).map_err(|e| self.failed(e.to_string()))?;
        let prior = self.store.read_bytes(path).map_err(|e| self.failed(e.to_string()))?;
        atomic_write(&absolute, normalize_text(content).as_bytes(), false)
            .map_err(|e| self.failed(format!("failed to stage {path}: {e}")))?;
        Ok(StagedFile {
            path: path.to_string(),
            absolute,
            prior,
        })
    }

    /// Put back every staged file, newest first. Keeps going past failures
    /// and reports the first one.
    fn restore(&self, staged: Vec<StagedFile>) -> Result<(), GenerationError> {
        let mut first_error = None;
        for file in staged.into_iter().rev() {
            let restored = match &file.prior {
                Some(bytes) => atomic_write(&file.absolute, bytes, true),
                None => fs::remove_file(&file.absolute),
            };
            if let Err(err) = restored {
                warn!(path = %file.path, error = %err, "failed to restore file after build check");
                first_error.get_or_insert_with(|| self.failed(format!("failed to restore {}: {err}", file.path)));
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn failed(&self, message: impl Into<String>) -> GenerationError {
        GenerationError::Backend {
            backend: "build".to_string(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl SelfCheck for BuildSelfCheck {
    fn name(&self) -> &str {
        "build"
    }

    async fn check(&self, unit: &VerificationUnit, candidate: &str) -> Result<Critique, GenerationError> {
        if self.dry_run {
            return Ok(Critique {
                ok: true,
                critique: "not built (dry run)".to_string(),
            });
        }

        let files: Vec<(&str, &str)> = unit
            .companions
            .iter()
            .filter(|(path, _)| **path != unit.path)
            .map(|(path, content)| (path.as_str(), content.as_str()))
            .chain(std::iter::once((unit.path.as_str(), candidate)))
            .collect();
        if let Some((path, _)) = files.iter().find(|(path, _)| is_suspicious_target(path)) {
            return Ok(Critique::fail(format!("refusing to stage suspicious target {path}")));
        }

        let mut staged = Vec::with_capacity(files.len());
        for (path, content) in files {
            match self.stage(path, content) {
                Ok(entry) => staged.push(entry),
                Err(err) => {
                    self.restore(staged)?;
                    return Err(err);
                }
            }
        }
        let outcome = self.runner.run(&self.spec).await;
        self.restore(staged)?;

        if outcome.success {
            info!(path = %unit.path, "build check passed");
            return Ok(Critique::pass());
        }
        let output = outcome.combined_output();
        let lines: Vec<&str> = output.lines().collect();
        let tail = lines[lines.len().saturating_sub(CRITIQUE_TAIL_LINES)..].join("\n");
        let critique = if outcome.timed_out {
            "build timed out with the candidate in place".to_string()
        } else if tail.trim().is_empty() {
            "build still fails (no output)".to_string()
        } else {
            format!("build still fails:\n{tail}")
        };
        Ok(Critique::fail(critique))
    }
}
