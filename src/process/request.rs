//! Execution request and result values
//!
//! A request is built per call and consumed by the runner; the result is
//! plain owned data, so no process handle ever leaves the runner.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

use crate::error::ProcessError;

/// Default wall-clock limit for a single invocation
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Exit code reported when the process never produced one
/// (launch failure, or terminated by a signal)
pub const SENTINEL_EXIT_CODE: i32 = -1;

/// Environment applied to every invocation before caller overrides
pub const BASELINE_ENV: &[(&str, &str)] = &[("GIT_TERMINAL_PROMPT", "0"), ("LC_ALL", "C")];

/// A single external program invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    /// Program to run (absolute path or name resolved through `PATH`)
    pub program: PathBuf,
    /// Argument vector, not including the program itself
    pub args: Vec<String>,
    /// Working directory; inherits the parent's when unset
    pub working_dir: Option<PathBuf>,
    /// Environment overrides, applied on top of [`BASELINE_ENV`]
    pub env: HashMap<String, String>,
    /// Wall-clock limit; `None` disables the timeout
    pub timeout: Option<Duration>,
    /// Bytes written to stdin, which is then closed
    pub stdin: Option<Vec<u8>>,
}

impl ExecutionRequest {
    /// Create a request with the default timeout and no arguments
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env: HashMap::new(),
            timeout: Some(DEFAULT_TIMEOUT),
            stdin: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.working_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Run without a wall-clock limit (clone, long fetches)
    pub fn without_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    pub fn stdin(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(payload.into());
        self
    }

    /// The merged environment: baseline first, caller overrides win
    pub fn effective_env(&self) -> HashMap<String, String> {
        let mut env: HashMap<String, String> = BASELINE_ENV
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        env.extend(self.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        env
    }

    /// Human-readable command line for logs and error messages
    pub fn command_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

impl fmt::Display for ExecutionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())
    }
}

/// Why a program could not be run at all
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "reason")]
pub enum LaunchFailure {
    /// The executable does not exist; retrying will not help
    ProgramNotFound,
    /// Any other spawn failure (permissions, resource limits)
    ExecutionFailed(String),
}

/// Captured outcome of one invocation
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    /// Command line that produced this result
    pub command: String,
    /// Raw stdout bytes
    #[serde(skip)]
    pub stdout_bytes: Vec<u8>,
    /// Stdout decoded as UTF-8, ill-formed sequences replaced
    pub stdout: String,
    /// Stderr decoded as UTF-8, ill-formed sequences replaced
    pub stderr: String,
    /// Process exit code, or [`SENTINEL_EXIT_CODE`]
    pub exit_code: i32,
    /// The process was terminated because it exceeded its timeout
    pub timed_out: bool,
    /// Set when the program could not be launched
    pub failure: Option<LaunchFailure>,
    /// Wall-clock time from launch to result assembly
    pub elapsed: Duration,
}

impl ExecutionResult {
    /// Result for a program that never started
    pub fn launch_failed(command: String, failure: LaunchFailure) -> Self {
        Self {
            command,
            stdout_bytes: Vec::new(),
            stdout: String::new(),
            stderr: String::new(),
            exit_code: SENTINEL_EXIT_CODE,
            timed_out: false,
            failure: Some(failure),
            elapsed: Duration::ZERO,
        }
    }

    /// Assemble a result from captured streams
    pub fn from_output(
        command: String,
        stdout_bytes: Vec<u8>,
        stderr_bytes: &[u8],
        exit_code: Option<i32>,
        timed_out: bool,
        elapsed: Duration,
    ) -> Self {
        Self {
            command,
            stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
            stdout_bytes,
            stderr: String::from_utf8_lossy(stderr_bytes).into_owned(),
            exit_code: exit_code.unwrap_or(SENTINEL_EXIT_CODE),
            timed_out,
            failure: None,
            elapsed,
        }
    }

    /// `exit_code == 0`
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }

    /// Turn launch failures and timeouts into typed errors.
    ///
    /// A nonzero exit is left alone: git uses it for expected conditions.
    pub fn check(self, program: &Path) -> Result<Self, ProcessError> {
        match &self.failure {
            Some(LaunchFailure::ProgramNotFound) => {
                return Err(ProcessError::ProgramNotFound(program.to_path_buf()));
            }
            Some(LaunchFailure::ExecutionFailed(reason)) => {
                return Err(ProcessError::LaunchFailed {
                    program: program.to_path_buf(),
                    reason: reason.clone(),
                });
            }
            None => {}
        }

        if self.timed_out {
            return Err(ProcessError::Timeout {
                command: self.command,
                elapsed: self.elapsed,
                partial_stdout: self.stdout,
            });
        }

        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults() {
        let request = ExecutionRequest::new("git");
        assert_eq!(request.timeout, Some(DEFAULT_TIMEOUT));
        assert!(request.args.is_empty());
        assert!(request.stdin.is_none());
    }

    #[test]
    fn test_overrides_win_over_baseline() {
        let request = ExecutionRequest::new("git")
            .env("LC_ALL", "en_US.UTF-8")
            .env("SSH_AUTH_SOCK", "/tmp/agent.sock");

        let env = request.effective_env();
        assert_eq!(env["LC_ALL"], "en_US.UTF-8");
        assert_eq!(env["GIT_TERMINAL_PROMPT"], "0");
        assert_eq!(env["SSH_AUTH_SOCK"], "/tmp/agent.sock");
    }

    #[test]
    fn test_command_line() {
        let request = ExecutionRequest::new("/usr/bin/git").args(["status", "--porcelain"]);
        assert_eq!(request.command_line(), "/usr/bin/git status --porcelain");
    }

    #[test]
    fn test_lossy_decoding() {
        let result = ExecutionResult::from_output(
            "x".to_string(),
            vec![b'o', 0xff, b'k'],
            b"",
            Some(0),
            false,
            Duration::ZERO,
        );
        assert_eq!(result.stdout, "o\u{fffd}k");
        assert_eq!(result.stdout_bytes.len(), 3);
        assert!(result.succeeded());
    }

    #[test]
    fn test_check_passes_nonzero_exit_through() {
        let result = ExecutionResult::from_output(
            "git diff --quiet".to_string(),
            Vec::new(),
            b"",
            Some(1),
            false,
            Duration::ZERO,
        );
        let checked = result.check(Path::new("git")).unwrap();
        assert!(!checked.succeeded());
        assert_eq!(checked.exit_code, 1);
    }

    #[test]
    fn test_check_classifies_failures() {
        let missing = ExecutionResult::launch_failed("nope".to_string(), LaunchFailure::ProgramNotFound);
        assert_eq!(missing.exit_code, SENTINEL_EXIT_CODE);
        assert!(matches!(
            missing.check(Path::new("nope")),
            Err(ProcessError::ProgramNotFound(_))
        ));

        let slow = ExecutionResult::from_output(
            "sleep 10".to_string(),
            b"partial".to_vec(),
            b"",
            None,
            true,
            Duration::from_secs(1),
        );
        match slow.check(Path::new("sleep")) {
            Err(ProcessError::Timeout { partial_stdout, .. }) => assert_eq!(partial_stdout, "partial"),
            other => panic!("expected timeout, got {:?}", other),
        }
    }
}
