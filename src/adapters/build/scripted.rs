//! Build runner that replays scripted outcomes; used by tests and dry runs.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::ports::{BuildOutcome, BuildRunner, BuildSpec};

/// Returns queued outcomes in order, then the fallback forever.
#[derive(Debug)]
pub struct ScriptedBuildRunner {
    queue: Mutex<VecDeque<BuildOutcome>>,
    fallback: BuildOutcome,
    calls: Mutex<Vec<BuildSpec>>,
}

impl ScriptedBuildRunner {
    pub fn passing() -> Self {
        Self::with_fallback(Self::success(""))
    }

    pub fn failing(output: impl Into<String>) -> Self {
        Self::with_fallback(Self::failure(output))
    }

    pub fn with_fallback(fallback: BuildOutcome) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            fallback,
            calls: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn then(self, outcome: BuildOutcome) -> Self {
        if let Ok(mut queue) = self.queue.lock() {
            queue.push_back(outcome);
        }
        self
    }

    pub fn success(stdout: impl Into<String>) -> BuildOutcome {
        BuildOutcome {
            success: true,
            stdout: stdout.into(),
            ..BuildOutcome::default()
        }
    }

    pub fn failure(stderr: impl Into<String>) -> BuildOutcome {
        BuildOutcome {
            success: false,
            stderr: stderr.into(),
            ..BuildOutcome::default()
        }
    }

    /// Number of runs so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().map_or(0, |calls| calls.len())
    }
}

#[async_trait]
impl BuildRunner for ScriptedBuildRunner {
    async fn run(&self, spec: &BuildSpec) -> BuildOutcome {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(spec.clone());
        }
        self.queue
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front())
            .unwrap_or_else(|| self.fallback.clone())
    }
}
