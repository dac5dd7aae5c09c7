//! Model client adapters and shared reply parsing.

pub mod command;
pub mod http;
pub mod reply;
pub mod scripted;

pub use command::CommandModelClient;
pub use http::HttpModelClient;
pub use scripted::ScriptedModelClient;
