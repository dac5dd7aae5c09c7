//! Common test utilities for integration tests
//!
//! A throwaway repository directory wired to in-memory collaborators:
//! a recording VCS, a scripted build runner and a scripted generator.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;

use mender::adapters::build::{CommandBuildRunner, ScriptedBuildRunner};
use mender::adapters::generators::ScriptedGenerator;
use mender::adapters::refiner::BuildSelfCheck;
use mender::adapters::state::JsonStateRepository;
use mender::adapters::vcs::MockVcs;
use mender::domain::models::{Config, Proposal, RunState};
use mender::domain::ports::{BuildRunner, StateRepository};
use mender::services::apply_orchestrator::build_spec;
use mender::services::{ContentStore, RepairComponents, RepairLoop};

/// A failing build log pointing at `src/lib.rs` line 2.
pub const LOG: &str = "   Compiling demo v0.1.0\nsrc/lib.rs:2: error: expected `;`, found `}`\nerror: could not compile `demo`\n";

pub const BROKEN: &str = "pub fn answer() -> u32 {\n    42\n}\npub fn broken() {\n    let x = 1\n}\n";
pub const FIXED: &str = "pub fn answer() -> u32 {\n    42\n}\npub fn broken() {\n    let x = 1;\n}\n";

/// Setup test logging
#[allow(dead_code)]
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Config tuned for tests: few passes, everything permitted, no threshold.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.auto_apply = true;
    config.allow_create = true;
    config.confidence_threshold = 0.0;
    config.convergence.passes = 3;
    config.verifier.max_attempts = 2;
    config.build.program = "true".to_string();
    config.build.args = Vec::new();
    config
}

pub fn proposal(path: &str, content: &str) -> Proposal {
    Proposal::new("scripted")
        .with_file(path, content)
        .with_confidence(0.9)
}

pub struct Harness {
    pub dir: TempDir,
    pub config: Config,
    pub vcs: Arc<MockVcs>,
    pub runner: Arc<ScriptedBuildRunner>,
    pub generator: Arc<ScriptedGenerator>,
}

impl Harness {
    pub fn new(generator: ScriptedGenerator, runner: ScriptedBuildRunner) -> Self {
        Self {
            dir: tempfile::tempdir().expect("Failed to create temp dir"),
            config: test_config(),
            vcs: Arc::new(MockVcs::default()),
            runner: Arc::new(runner),
            generator: Arc::new(generator),
        }
    }

    /// Generator that always proposes [`FIXED`] for `src/lib.rs`, with a passing build.
    pub fn fixing() -> Self {
        Self::new(
            ScriptedGenerator::constant("scripted", proposal("src/lib.rs", FIXED)),
            ScriptedBuildRunner::passing(),
        )
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, path: &str, content: &str) {
        let target = self.root().join(path);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent dir");
        }
        std::fs::write(target, content).expect("Failed to write fixture");
    }

    pub fn read(&self, path: &str) -> Option<String> {
        std::fs::read_to_string(self.root().join(path)).ok()
    }

    pub fn state_repo(&self) -> JsonStateRepository {
        JsonStateRepository::new(self.root().join(&self.config.state_dir))
    }

    pub async fn state(&self) -> RunState {
        self.state_repo().load().await.expect("Failed to load state")
    }

    pub async fn save_state(&self, state: &RunState) {
        self.state_repo().save(state).await.expect("Failed to save state");
    }

    pub fn components(&self) -> RepairComponents {
        self.components_with(self.runner.clone())
    }

    fn components_with(&self, runner: Arc<dyn BuildRunner>) -> RepairComponents {
        let checker = BuildSelfCheck::new(
            ContentStore::new(self.root()),
            runner.clone(),
            build_spec(&self.config.build, self.root()),
        )
        .with_dry_run(self.config.dry_run);

        RepairComponents {
            generator: self.generator.clone(),
            refiner: None,
            checker: Arc::new(checker),
            vcs: self.vcs.clone(),
            runner,
            state: Arc::new(self.state_repo()),
        }
    }

    pub fn repair_loop(&self) -> RepairLoop {
        RepairLoop::new(self.config.clone(), self.root(), self.components())
            .expect("Failed to build repair loop")
    }

    /// Loop whose build really runs `config.build` in the repository.
    pub fn command_loop(&self) -> RepairLoop {
        let components = self.components_with(Arc::new(CommandBuildRunner::new()));
        RepairLoop::new(self.config.clone(), self.root(), components).expect("Failed to build repair loop")
    }
}
