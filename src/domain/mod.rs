//! Domain layer for the mender repair loop
//!
//! This module contains core models, errors and the ports external
//! collaborators implement.

pub mod errors;
pub mod models;
pub mod ports;

// Re-export error types for convenient access
pub use errors::{DomainError, DomainResult, GenerationError, StateError, VcsError, WriteError};
