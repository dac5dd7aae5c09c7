//! Model client that replays canned replies; used by tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::errors::GenerationError;
use crate::domain::ports::{ModelClient, ModelRequest};

/// Pops one reply per call; once the queue is empty the fallback repeats.
#[derive(Debug)]
pub struct ScriptedModelClient {
    name: String,
    replies: Mutex<VecDeque<Result<String, GenerationError>>>,
    fallback: Result<String, GenerationError>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModelClient {
    pub fn new(name: impl Into<String>, fallback: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            replies: Mutex::new(VecDeque::new()),
            fallback: Ok(fallback.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(name: impl Into<String>, error: GenerationError) -> Self {
        Self {
            name: name.into(),
            replies: Mutex::new(VecDeque::new()),
            fallback: Err(error),
            requests: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn then(self, reply: impl Into<String>) -> Self {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(Ok(reply.into()));
        }
        self
    }

    #[must_use]
    pub fn then_err(self, error: GenerationError) -> Self {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(Err(error));
        }
        self
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ModelClient for ScriptedModelClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: &ModelRequest) -> Result<String, GenerationError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        self.replies
            .lock()
            .ok()
            .and_then(|mut replies| replies.pop_front())
            .unwrap_or_else(|| self.fallback.clone())
    }
}
