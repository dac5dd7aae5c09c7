//! Build/test runner adapters.

pub mod command;
pub mod scripted;

pub use command::CommandBuildRunner;
pub use scripted::ScriptedBuildRunner;
