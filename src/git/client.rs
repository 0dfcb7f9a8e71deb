//! Git command client
//!
//! Binds a runner to one repository: executable path, working directory,
//! default timeout and extra environment. Every git invocation in the crate
//! goes through here, one sequential call at a time per caller.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, instrument};

use super::branch::{BRANCH_FORMAT, Branch, parse_branches};
use super::commits::{Commit, LOG_FORMAT, parse_log};
use super::reflog::{REFLOG_FORMAT, ReflogEntry, parse_reflog};
use super::status::{IndexStages, UnmergedEntry, parse_index_stages, parse_unmerged};
use crate::config::Config;
use crate::error::{GitError, Result};
use crate::process::{CommandRunner, DEFAULT_TIMEOUT, ExecutionRequest, ExecutionResult, ProcessRunner};

/// Git client for a single working tree
#[derive(Debug, Clone)]
pub struct Git<R = ProcessRunner> {
    runner: R,
    program: PathBuf,
    workdir: PathBuf,
    timeout: Option<Duration>,
    env: HashMap<String, String>,
}

impl Git<ProcessRunner> {
    /// Client using the configured executable, timeout and environment
    pub fn from_config(config: &Config, workdir: impl Into<PathBuf>) -> Self {
        Self::with_runner(ProcessRunner::new(), &config.git_path, workdir)
            .with_timeout(config.timeout())
            .with_envs(config.env.clone())
    }
}

impl<R: CommandRunner> Git<R> {
    pub fn with_runner(runner: R, program: impl Into<PathBuf>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            program: program.into(),
            workdir: workdir.into(),
            timeout: Some(DEFAULT_TIMEOUT),
            env: HashMap::new(),
        }
    }

    /// Set the default timeout; `None` disables it
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Inject an environment variable into every call
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_envs(mut self, vars: HashMap<String, String>) -> Self {
        self.env.extend(vars);
        self
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// A request for `git <args>` in this working tree
    pub fn request(&self, args: &[&str]) -> ExecutionRequest {
        let request = ExecutionRequest::new(&self.program)
            .args(args.iter().copied())
            .current_dir(&self.workdir)
            .envs(self.env.clone());

        match self.timeout {
            Some(limit) => request.timeout(limit),
            None => request.without_timeout(),
        }
    }

    /// Execute a prepared request; launch failures and timeouts become errors
    pub async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionResult> {
        debug!("Running {}", request);
        let result = self.runner.run(request).await.check(&self.program)?;
        Ok(result)
    }

    /// Run `git <args>`; a nonzero exit is returned as data
    pub async fn run(&self, args: &[&str]) -> Result<ExecutionResult> {
        self.execute(self.request(args)).await
    }

    /// Run `git <args>` and return stdout, failing on a nonzero exit
    pub async fn output(&self, args: &[&str]) -> Result<String> {
        let result = self.run(args).await?;
        require_success(result).map(|r| r.stdout)
    }

    /// Reflog of `reference`, newest first
    #[instrument(skip(self))]
    pub async fn reflog(&self, reference: &str, limit: usize) -> Result<Vec<ReflogEntry>> {
        let limit = limit.to_string();
        let output = self
            .output(&["reflog", "show", REFLOG_FORMAT, "-n", &limit, reference, "--"])
            .await?;
        Ok(parse_reflog(&output)?)
    }

    /// Local and remote-tracking branches, without `<remote>/HEAD` pointers
    #[instrument(skip(self))]
    pub async fn branches(&self) -> Result<Vec<Branch>> {
        let output = self
            .output(&["for-each-ref", BRANCH_FORMAT, "refs/heads", "refs/remotes"])
            .await?;
        let branches = parse_branches(&output)?
            .into_iter()
            .filter(|b| !b.is_remote_head())
            .collect();
        Ok(branches)
    }

    /// Commits reachable from `revision`, newest first
    #[instrument(skip(self))]
    pub async fn log(&self, revision: &str, limit: usize) -> Result<Vec<Commit>> {
        let limit = limit.to_string();
        let output = self
            .output(&["log", LOG_FORMAT, "-n", &limit, revision, "--"])
            .await?;
        Ok(parse_log(&output)?)
    }

    /// Paths git reports as unmerged
    pub async fn unmerged_files(&self) -> Result<Vec<UnmergedEntry>> {
        let output = self
            .output(&["status", "--porcelain=v2", "-z", "--untracked-files=no"])
            .await?;
        Ok(parse_unmerged(&output)?)
    }

    /// Objects recorded in index stages 1-3 for `path`
    pub async fn index_stages(&self, path: &str) -> Result<IndexStages> {
        let output = self.output(&["ls-files", "-u", "-z", "--", path]).await?;
        Ok(parse_index_stages(&output)?)
    }

    /// Raw contents of a blob; binary content is returned unchanged
    pub async fn blob(&self, object: &str) -> Result<Vec<u8>> {
        let result = require_success(self.run(&["cat-file", "blob", object]).await?)?;
        Ok(result.stdout_bytes)
    }

    /// `git add -- <path>`
    pub async fn stage(&self, path: &str) -> Result<()> {
        self.output(&["add", "--", path]).await?;
        Ok(())
    }

    /// `git rm -- <path>`
    pub async fn remove(&self, path: &str) -> Result<()> {
        self.output(&["rm", "--quiet", "--", path]).await?;
        Ok(())
    }

    /// Short name of the checked-out branch; `None` when HEAD is detached
    pub async fn current_branch(&self) -> Result<Option<String>> {
        let result = self.run(&["symbolic-ref", "--short", "-q", "HEAD"]).await?;
        if result.succeeded() {
            Ok(Some(result.stdout.trim().to_string()))
        } else {
            Ok(None)
        }
    }

    /// Abbreviate an object name
    pub async fn short_hash(&self, object: &str) -> Result<String> {
        let output = self.output(&["rev-parse", "--short", object]).await?;
        Ok(output.trim().to_string())
    }
}

/// Convert a nonzero exit into [`GitError::CommandFailed`]
pub fn require_success(result: ExecutionResult) -> Result<ExecutionResult> {
    if result.succeeded() {
        Ok(result)
    } else {
        Err(GitError::CommandFailed {
            command: result.command,
            code: result.exit_code,
            stderr: result.stderr.trim().to_string(),
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;

    /// Replays one canned result and remembers the request
    struct CannedRunner {
        result: ExecutionResult,
        seen: Mutex<Vec<ExecutionRequest>>,
    }

    impl CannedRunner {
        fn new(stdout: &str, exit_code: i32) -> Self {
            Self::with_bytes(stdout.as_bytes(), exit_code)
        }

        fn with_bytes(stdout: &[u8], exit_code: i32) -> Self {
            Self {
                result: ExecutionResult::from_output(
                    "git".to_string(),
                    stdout.to_vec(),
                    b"boom",
                    Some(exit_code),
                    false,
                    Duration::ZERO,
                ),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CommandRunner for CannedRunner {
        async fn run(&self, request: ExecutionRequest) -> ExecutionResult {
            self.seen.lock().unwrap().push(request);
            self.result.clone()
        }
    }

    #[test]
    fn test_request_carries_client_settings() {
        let git = Git::with_runner(CannedRunner::new("", 0), "/usr/bin/git", "/repo")
            .with_timeout(None)
            .with_env("SSH_AUTH_SOCK", "/tmp/agent");

        let request = git.request(&["status"]);
        assert_eq!(request.program, PathBuf::from("/usr/bin/git"));
        assert_eq!(request.working_dir, Some(PathBuf::from("/repo")));
        assert_eq!(request.timeout, None);
        assert_eq!(request.env["SSH_AUTH_SOCK"], "/tmp/agent");
    }

    #[tokio::test]
    async fn test_branches_drop_remote_head() {
        let output = " |refs/remotes/origin/HEAD|origin|abc||\n*|refs/heads/main|main|abc||\n";
        let git = Git::with_runner(CannedRunner::new(output, 0), "git", "/repo");

        let branches = git.branches().await.unwrap();
        assert_eq!(branches.len(), 1);
        assert_eq!(branches[0].name, "main");

        let seen = git.runner().seen.lock().unwrap();
        assert_eq!(seen[0].args[0], "for-each-ref");
    }

    #[tokio::test]
    async fn test_output_requires_success() {
        let git = Git::with_runner(CannedRunner::new("", 128), "git", "/repo");
        match git.output(&["log"]).await {
            Err(crate::Error::Git(GitError::CommandFailed { code, stderr, .. })) => {
                assert_eq!(code, 128);
                assert_eq!(stderr, "boom");
            }
            other => panic!("expected CommandFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_run_passes_nonzero_exit_through() {
        let git = Git::with_runner(CannedRunner::new("", 1), "git", "/repo");
        let result = git.run(&["diff", "--quiet"]).await.unwrap();
        assert_eq!(result.exit_code, 1);
    }

    #[tokio::test]
    async fn test_blob_keeps_binary_bytes() {
        let png = b"\x89PNG\xff\x00\xfe";
        let git = Git::with_runner(CannedRunner::with_bytes(png, 0), "git", "/repo");

        let blob = git.blob("abc123").await.unwrap();
        assert_eq!(blob, png.to_vec());
        assert_eq!(
            git.runner().seen.lock().unwrap()[0].args,
            vec!["cat-file", "blob", "abc123"]
        );
    }
}
