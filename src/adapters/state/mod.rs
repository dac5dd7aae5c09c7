//! Persisted run-state adapters.

pub mod json;

pub use json::JsonStateRepository;
