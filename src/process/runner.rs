//! Async process runner with concurrent output draining
//!
//! Provides non-blocking program execution with:
//! - stdout and stderr drained by two independent tasks while the child runs
//! - Timeout handling (SIGTERM, grace period, then SIGKILL) for the child's
//!   whole process group, so helpers it spawned go down with it
//! - Partial output preserved when the child is terminated

use std::io;
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

use super::{ExecutionRequest, ExecutionResult, LaunchFailure};

/// Time a terminated child gets to exit after SIGTERM before SIGKILL
pub const TERMINATION_GRACE: Duration = Duration::from_secs(2);

/// Time the drain readers get to hit EOF once the child is gone
pub const DRAIN_GRACE: Duration = Duration::from_secs(2);

const CHUNK_SIZE: usize = 8192;

type SharedBuffer = Arc<Mutex<Vec<u8>>>;

/// Anything that can execute an [`ExecutionRequest`]
///
/// Implemented by [`ProcessRunner`]; tests substitute scripted runners.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run the request to completion. Never fails: launch failures and
    /// timeouts are reported inside the result.
    async fn run(&self, request: ExecutionRequest) -> ExecutionResult;
}

/// Executes external programs as child processes
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    #[instrument(skip(self, request), fields(command = %request))]
    async fn run(&self, request: ExecutionRequest) -> ExecutionResult {
        let command_line = request.command_line();

        let mut cmd = Command::new(&request.program);
        cmd.args(&request.args)
            .envs(request.effective_env())
            .stdin(if request.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // own group, so a timeout reaches every descendant
            .process_group(0)
            .kill_on_drop(true);

        if let Some(dir) = &request.working_dir {
            cmd.current_dir(dir);
        }

        let started = Instant::now();
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to launch {}: {}", command_line, e);
                return ExecutionResult::launch_failed(command_line, classify_spawn_error(&e));
            }
        };

        // Both readers must be running before anything waits on the child,
        // otherwise a full pipe blocks the child and nobody drains it.
        let stdout_buf = SharedBuffer::default();
        let stderr_buf = SharedBuffer::default();
        let stdout_task = child
            .stdout
            .take()
            .map(|out| tokio::spawn(drain(out, Arc::clone(&stdout_buf))));
        let stderr_task = child
            .stderr
            .take()
            .map(|err| tokio::spawn(drain(err, Arc::clone(&stderr_buf))));

        let stdin_task = match (request.stdin, child.stdin.take()) {
            (Some(payload), Some(mut stdin)) => Some(tokio::spawn(async move {
                stdin.write_all(&payload).await?;
                stdin.shutdown().await
                // dropping `stdin` here closes the pipe
            })),
            _ => None,
        };

        let exited = match request.timeout {
            Some(limit) => timeout(limit, wait_for_exit(&mut child, stdin_task))
                .await
                .ok(),
            None => Some(wait_for_exit(&mut child, stdin_task).await),
        };

        let (exit_code, timed_out) = match exited {
            Some(Ok(status)) => (status.code(), false),
            Some(Err(e)) => {
                warn!("Failed waiting for {}: {}", command_line, e);
                (None, false)
            }
            None => {
                warn!(
                    "{} exceeded its timeout of {:?}, terminating",
                    command_line, request.timeout
                );
                (terminate(&mut child).await, true)
            }
        };

        join_readers(stdout_task, stderr_task).await;

        let stdout = take_buffer(&stdout_buf);
        let stderr = take_buffer(&stderr_buf);
        let elapsed = started.elapsed();

        debug!(
            exit_code = ?exit_code,
            timed_out,
            stdout_len = stdout.len(),
            stderr_len = stderr.len(),
            "Finished in {:?}",
            elapsed
        );

        ExecutionResult::from_output(command_line, stdout, &stderr, exit_code, timed_out, elapsed)
    }
}

fn classify_spawn_error(e: &io::Error) -> LaunchFailure {
    match e.kind() {
        io::ErrorKind::NotFound => LaunchFailure::ProgramNotFound,
        _ => LaunchFailure::ExecutionFailed(e.to_string()),
    }
}

/// Append everything the reader yields to `sink` until EOF
async fn drain<R>(mut reader: R, sink: SharedBuffer) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; CHUNK_SIZE];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        sink.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(&chunk[..n]);
    }
}

/// Finish feeding stdin, then wait for the child to exit
async fn wait_for_exit(
    child: &mut Child,
    stdin_task: Option<JoinHandle<io::Result<()>>>,
) -> io::Result<std::process::ExitStatus> {
    if let Some(task) = stdin_task {
        match task.await {
            Ok(Err(e)) if e.kind() == io::ErrorKind::BrokenPipe => {
                debug!("Child closed stdin before reading the whole payload");
            }
            Ok(Err(e)) => warn!("Failed to write stdin: {}", e),
            Err(e) => warn!("Stdin writer task failed: {}", e),
            Ok(Ok(())) => {}
        }
    }
    child.wait().await
}

/// SIGTERM the child's process group, wait out the grace period, then SIGKILL it
async fn terminate(child: &mut Child) -> Option<i32> {
    // the child leads its own group, so its pid is the group id
    let group = child.id().map(|pid| Pid::from_raw(pid as i32));
    signal_group(group, Signal::SIGTERM);

    let code = match timeout(TERMINATION_GRACE, child.wait()).await {
        Ok(Ok(status)) => status.code(),
        _ => {
            signal_group(group, Signal::SIGKILL);
            if let Err(e) = child.kill().await {
                warn!("Failed to kill child process: {}", e);
            }
            None
        }
    };

    // descendants that ignored SIGTERM must not outlive the call
    signal_group(group, Signal::SIGKILL);
    code
}

fn signal_group(group: Option<Pid>, sig: Signal) {
    let Some(group) = group else { return };
    match signal::killpg(group, sig) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => debug!("{} to process group {} failed: {}", sig, group, e),
    }
}

/// Barrier for the two drain tasks.
///
/// A grandchild that inherited the pipes can keep them open after the child
/// exits; after [`DRAIN_GRACE`] the readers are abandoned and whatever they
/// captured so far is kept.
async fn join_readers(
    stdout_task: Option<JoinHandle<io::Result<()>>>,
    stderr_task: Option<JoinHandle<io::Result<()>>>,
) {
    let abort_handles: Vec<_> = stdout_task
        .iter()
        .chain(stderr_task.iter())
        .map(|task| task.abort_handle())
        .collect();

    let both = futures::future::join(join_reader(stdout_task), join_reader(stderr_task));
    if timeout(DRAIN_GRACE, both).await.is_err() {
        warn!("Output pipes still open {:?} after exit, abandoning readers", DRAIN_GRACE);
        for handle in abort_handles {
            handle.abort();
        }
    }
}

async fn join_reader(task: Option<JoinHandle<io::Result<()>>>) {
    if let Some(task) = task {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Failed to read child output: {}", e),
            Err(e) if e.is_cancelled() => {}
            Err(e) => warn!("Output reader task failed: {}", e),
        }
    }
}

fn take_buffer(buffer: &SharedBuffer) -> Vec<u8> {
    std::mem::take(&mut *buffer.lock().unwrap_or_else(PoisonError::into_inner))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_captures_both_streams() {
        let request = ExecutionRequest::new("sh").args(["-c", "echo out; echo err >&2; exit 3"]);
        let result = ProcessRunner::new().run(request).await;

        assert_eq!(result.stdout, "out\n");
        assert_eq!(result.stderr, "err\n");
        assert_eq!(result.exit_code, 3);
        assert!(!result.succeeded());
        assert!(!result.timed_out);
        assert!(result.failure.is_none());
    }

    #[tokio::test]
    async fn test_missing_program_is_classified() {
        let request = ExecutionRequest::new("/definitely/not/a/real/program");
        let result = ProcessRunner::new().run(request).await;

        assert_eq!(result.failure, Some(LaunchFailure::ProgramNotFound));
        assert_eq!(result.exit_code, crate::process::SENTINEL_EXIT_CODE);
    }

    #[tokio::test]
    async fn test_stdin_is_closed_after_payload() {
        let request = ExecutionRequest::new("cat").stdin("hello from stdin");
        let result = ProcessRunner::new().run(request).await;

        assert!(result.succeeded());
        assert_eq!(result.stdout, "hello from stdin");
    }

    #[tokio::test]
    async fn test_baseline_env_is_applied() {
        let request = ExecutionRequest::new("sh").args(["-c", "echo $LC_ALL $GIT_TERMINAL_PROMPT"]);
        let result = ProcessRunner::new().run(request).await;

        assert_eq!(result.stdout.trim(), "C 0");
    }

    #[tokio::test]
    async fn test_working_dir_is_honoured() {
        let dir = tempfile::TempDir::new().unwrap();
        let request = ExecutionRequest::new("pwd").current_dir(dir.path());
        let result = ProcessRunner::new().run(request).await;

        let reported = std::path::PathBuf::from(result.stdout.trim());
        assert_eq!(
            reported.canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }
}
