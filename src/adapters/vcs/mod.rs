//! Version control adapters.

pub mod git;
pub mod mock;

pub use git::GitCli;
pub use mock::MockVcs;
