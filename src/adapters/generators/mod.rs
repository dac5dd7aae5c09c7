//! Generator backends.

pub mod model;
pub mod scripted;
pub mod template;

pub use model::{length_confidence, parse_proposal, ModelGenerator};
pub use scripted::ScriptedGenerator;
pub use template::TemplateGenerator;
