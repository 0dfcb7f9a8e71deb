//! GitFlow - The git engine behind the GitFlow desktop client
//!
//! This crate drives the system `git` binary and turns its output into typed
//! data. It has no window, network or settings-store code of its own; those
//! layers call into it.
//!
//! # Architecture
//!
//! Leaf to root:
//! - **ProcessRunner** - Runs a program with a timeout, draining stdout and
//!   stderr concurrently so a chatty child can never deadlock on a full pipe
//! - **Parsers** - Pure functions over git's delimited output formats
//!   (reflog, branches, log, unmerged status)
//! - **ConflictResolutionEngine** - Tracks an in-progress merge, rebase,
//!   cherry-pick or revert and walks it to completion
//!
//! # Modules
//!
//! - [`process`] - Subprocess execution
//! - [`git`] - Git client, repository discovery and output parsers
//! - [`conflict`] - Merge-conflict state machine and marker handling
//! - [`config`] - Layered configuration
//! - [`error`] - Error types

pub mod config;
pub mod conflict;
pub mod error;
pub mod git;
pub mod process;

pub use config::Config;
pub use conflict::{ConflictResolutionEngine, EngineState, MergeState};
pub use error::{Error, Result};
pub use git::{Branch, Git, ReflogEntry, RepoPaths};
pub use process::{CommandRunner, ExecutionRequest, ExecutionResult, ProcessRunner};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
