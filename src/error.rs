//! Error types for gitflow
//!
//! Uses `thiserror` for ergonomic error definitions with automatic `Display` and `Error` impls.
//! A nonzero git exit status is deliberately absent from this taxonomy: it travels as data
//! inside [`ExecutionResult`](crate::process::ExecutionResult).

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::conflict::OperationKind;

/// Top-level error type for gitflow
#[derive(Error, Debug)]
pub enum Error {
    #[error("Process error: {0}")]
    Process(#[from] ProcessError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Git error: {0}")]
    Git(#[from] GitError),

    #[error("Conflict resolution error: {0}")]
    Conflict(#[from] ConflictError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures to launch or finish an external program
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessError {
    #[error("Program not found: {0}")]
    ProgramNotFound(PathBuf),

    #[error("Failed to launch {program}: {reason}")]
    LaunchFailed { program: PathBuf, reason: String },

    #[error("Command timed out after {elapsed:?}: {command}")]
    Timeout {
        command: String,
        elapsed: Duration,
        /// Output captured before the process was terminated
        partial_stdout: String,
    },
}

impl ProcessError {
    /// Whether retrying the same call can possibly succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// A record in git output that does not have the expected shape
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{context}: {fragment:?}")]
pub struct ParseError {
    /// What was being parsed and what went wrong
    pub context: String,
    /// The raw text that could not be parsed
    pub fragment: String,
}

impl ParseError {
    pub fn new(context: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            fragment: fragment.into(),
        }
    }
}

/// Git operations errors
#[derive(Error, Debug)]
pub enum GitError {
    #[error("Not a git repository: {0}")]
    NotARepository(PathBuf),

    #[error("Git command failed ({code}): {command} - {stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("Gitoxide error: {0}")]
    Gix(String),
}

/// Conflict resolution workflow errors
///
/// These are validation failures raised locally; none of them reach git.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConflictError {
    #[error("No merge, rebase, cherry-pick or revert is in progress")]
    NoOperationInProgress,

    #[error("{count} conflicted file(s) are still unresolved")]
    UnresolvedFiles { count: usize },

    #[error("'{path}' still contains {sections} conflict section(s)")]
    MarkersRemain { path: String, sections: usize },

    #[error("'{0}' is not part of the current conflict")]
    UnknownFile(String),

    #[error("Merged content of '{0}' has not been loaded")]
    ContentNotLoaded(String),

    #[error("'{path}' has no conflict section {index}")]
    SectionOutOfRange { path: String, index: usize },

    #[error("'{0}' is not UTF-8 text; take one side of it instead")]
    NotText(String),

    #[error("Section {index} of '{path}' is already resolved")]
    SectionAlreadyResolved { path: String, index: usize },

    #[error("{0} cannot be skipped")]
    SkipNotSupported(OperationKind),

    #[error("Git stopped without reporting conflicts: {stderr}")]
    ContinueStopped { stderr: String },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),

    #[error("Failed to create config directory: {0}")]
    DirectoryCreationFailed(PathBuf),
}

/// Result type alias using our error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProcessError::ProgramNotFound(PathBuf::from("/usr/bin/git"));
        assert!(err.to_string().contains("/usr/bin/git"));

        let err = ParseError::new("reflog record has 3 fields, expected 7", "abc\u{1e}def");
        assert!(err.to_string().contains("expected 7"));
        assert!(err.to_string().contains("abc"));

        let err = ConflictError::MarkersRemain {
            path: "src/lib.rs".to_string(),
            sections: 2,
        };
        assert!(err.to_string().contains("src/lib.rs"));
    }

    #[test]
    fn test_error_conversion() {
        let parse_err = ParseError::new("context", "fragment");
        let top: Error = parse_err.into();
        assert!(matches!(top, Error::Parse(_)));

        let conflict_err = ConflictError::NoOperationInProgress;
        let top: Error = conflict_err.into();
        assert!(matches!(top, Error::Conflict(_)));
    }

    #[test]
    fn test_only_timeouts_are_retryable() {
        let timeout = ProcessError::Timeout {
            command: "git clone".to_string(),
            elapsed: Duration::from_secs(30),
            partial_stdout: String::new(),
        };
        assert!(timeout.is_retryable());
        assert!(!ProcessError::ProgramNotFound(PathBuf::from("git")).is_retryable());
    }
}
