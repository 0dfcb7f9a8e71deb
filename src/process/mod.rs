//! External process execution
//!
//! - `ExecutionRequest` / `ExecutionResult` - Immutable call values
//! - `ProcessRunner` - Deadlock-free async runner with timeouts
//! - `CommandRunner` - Seam for substituting the runner

mod request;
mod runner;

pub use request::*;
pub use runner::*;
