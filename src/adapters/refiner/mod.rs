//! Refiner and self-check adapters for the verify-and-refine loop.

pub mod build_check;
pub mod model;

pub use build_check::BuildSelfCheck;
pub use model::{ModelRefiner, ModelSelfCheck};
