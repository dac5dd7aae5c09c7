//! Run state as four JSON documents under `<state_dir>/state/`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::errors::{DomainResult, StateError};
use crate::domain::models::RunState;
use crate::domain::ports::StateRepository;
use crate::services::content_store::atomic_write;

pub const ISSUES_FILE: &str = "issues.json";
pub const LEDGER_FILE: &str = "written_hashes.json";
pub const PROCESSED_FILE: &str = "processed.json";
pub const ATTEMPTS_FILE: &str = "attempts.json";

#[derive(Debug, Clone)]
pub struct JsonStateRepository {
    dir: PathBuf,
}

impl JsonStateRepository {
    /// `state_dir` is the tool's state directory; documents live in its `state/` child.
    pub fn new(state_dir: impl AsRef<Path>) -> Self {
        Self {
            dir: state_dir.as_ref().join("state"),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Missing documents are empty; unreadable or corrupt ones are empty with a warning.
    fn load_doc<T: DeserializeOwned + Default>(&self, name: &str) -> T {
        let path = self.dir.join(name);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return T::default(),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "state document unreadable; starting empty");
                return T::default();
            }
        };
        if text.trim().is_empty() {
            return T::default();
        }
        serde_json::from_str(&text).unwrap_or_else(|err| {
            warn!(path = %path.display(), error = %err, "state document corrupt; starting empty");
            T::default()
        })
    }

    fn save_doc<T: Serialize>(&self, name: &str, value: &T) -> Result<(), StateError> {
        let path = self.dir.join(name);
        let json = serde_json::to_vec_pretty(value).map_err(|e| StateError::Encode {
            path: path.clone(),
            message: e.to_string(),
        })?;
        atomic_write(&path, &json, true).map_err(|source| StateError::Io { path, source })
    }
}

#[async_trait]
impl StateRepository for JsonStateRepository {
    async fn load(&self) -> DomainResult<RunState> {
        let state = RunState {
            issues: self.load_doc(ISSUES_FILE),
            ledger: self.load_doc(LEDGER_FILE),
            processed: self.load_doc(PROCESSED_FILE),
            attempts: self.load_doc(ATTEMPTS_FILE),
        };
        debug!(
            issues = state.issues.len(),
            ledger = state.ledger.len(),
            processed = state.processed.len(),
            "loaded run state"
        );
        Ok(state)
    }

    async fn save(&self, state: &RunState) -> DomainResult<()> {
        self.save_doc(ISSUES_FILE, &state.issues)?;
        self.save_doc(LEDGER_FILE, &state.ledger)?;
        self.save_doc(PROCESSED_FILE, &state.processed)?;
        self.save_doc(ATTEMPTS_FILE, &state.attempts)?;
        Ok(())
    }
}
