//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines async trait interfaces that adapters must implement:
//! - Generator: candidate-producing backends
//! - ModelClient: text completion backends
//! - Refiner / SelfCheck: analysis, rewrite and critique steps
//! - BuildRunner: external build/test execution
//! - VersionControl: branch, commit, revert, review
//! - StateRepository: persisted run state

pub mod build_runner;
pub mod generator;
pub mod model_client;
pub mod refiner;
pub mod state_repository;
pub mod vcs;

pub use build_runner::{BuildOutcome, BuildRunner, BuildSpec};
pub use generator::{GenerationRequest, Generator};
pub use model_client::{ModelClient, ModelRequest};
pub use refiner::{Analysis, Critique, Refiner, SelfCheck, VerificationUnit};
pub use state_repository::StateRepository;
pub use vcs::VersionControl;
