//! Generator that replays canned proposals; used by tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::errors::GenerationError;
use crate::domain::models::Proposal;
use crate::domain::ports::{GenerationRequest, Generator};

#[derive(Debug)]
pub struct ScriptedGenerator {
    name: String,
    queue: Mutex<VecDeque<Result<Proposal, GenerationError>>>,
    fallback: Result<Proposal, GenerationError>,
    calls: AtomicU32,
}

impl ScriptedGenerator {
    /// Always proposes `proposal`.
    pub fn constant(name: impl Into<String>, proposal: Proposal) -> Self {
        Self {
            name: name.into(),
            queue: Mutex::new(VecDeque::new()),
            fallback: Ok(proposal),
            calls: AtomicU32::new(0),
        }
    }

    pub fn failing(name: impl Into<String>, error: GenerationError) -> Self {
        Self {
            name: name.into(),
            queue: Mutex::new(VecDeque::new()),
            fallback: Err(error),
            calls: AtomicU32::new(0),
        }
    }

    #[must_use]
    pub fn then(self, result: Result<Proposal, GenerationError>) -> Self {
        if let Ok(mut queue) = self.queue.lock() {
            queue.push_back(result);
        }
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn propose(&self, _request: &GenerationRequest) -> Result<Proposal, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queue
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front())
            .unwrap_or_else(|| self.fallback.clone())
    }
}
