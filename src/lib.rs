//! mender - unattended build-repair and backlog loop
//!
//! Given a failing build log or a backlog of unimplemented items, mender
//! detects normalized issues, generates candidate fixes through a chain of
//! backends, keeps only candidates that converge across passes and survive a
//! verify-and-refine loop, scores them, and applies them on a branch with a
//! byte-exact rollback when post-apply tests fail. Fixes that worked are
//! remembered and reused, up to a bound.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): models, errors and the port traits
//! - **Service Layer** (`services`): the repair loop and its stages
//! - **Adapters** (`adapters`): build runners, model clients, generators, git, state files
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use mender::adapters::build_components;
//! use mender::infrastructure::config::ConfigLoader;
//! use mender::services::{RepairLoop, Source};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let root = std::env::current_dir()?;
//!     let config = ConfigLoader::load(&root)?;
//!     let components = build_components(&config, &root)?;
//!     let summary = RepairLoop::new(config, &root, components)?
//!         .run(Source::Build)
//!         .await?;
//!     println!("{} committed", summary.auto_applied());
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{
    ApplyOutcome, Candidate, Config, Issue, IssueKind, IssueResult, LoggingConfig, Proposal,
    RunSummary, StoredResolution,
};
pub use domain::ports::{BuildRunner, Generator, Refiner, SelfCheck, StateRepository, VersionControl};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{RepairLoop, Source};
