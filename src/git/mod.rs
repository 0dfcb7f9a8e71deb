//! Git command layer
//!
//! - `Git` - Runs git through a `CommandRunner` and returns typed records
//! - `RepoPaths` - Repository discovery via gitoxide
//! - `reflog`, `branch`, `commits`, `status` - Pure parsers for git's output formats

mod backend;
mod branch;
mod client;
mod commits;
mod reflog;
mod status;

pub use backend::*;
pub use branch::*;
pub use client::*;
pub use commits::*;
pub use reflog::*;
pub use status::*;
