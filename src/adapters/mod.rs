//! Adapters for external systems: processes, models, VCS and on-disk state.

pub mod build;
pub mod generators;
pub mod models;
pub mod process;
pub mod refiner;
pub mod registry;
pub mod state;
pub mod vcs;

pub use registry::{build_components, build_generator_chain, ModelRegistry};
