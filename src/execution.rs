use crate::core::exit_code;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fmt;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How long to keep draining stdout/stderr after the child is gone.
const PIPE_DRAIN_GRACE: Duration = Duration::from_secs(5);
const CLEANUP_TIMEOUT: Duration = Duration::from_secs(30);

/// An external command as an argument vector. Never passed through a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: OsString,
    pub args: Vec<OsString>,
    /// Run after the command is forcibly killed, e.g. to remove a named container.
    pub cleanup: Option<Box<CommandSpec>>,
}

impl CommandSpec {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cleanup: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_cleanup(mut self, cleanup: CommandSpec) -> Self {
        self.cleanup = Some(Box::new(cleanup));
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|part| quote_for_display(&part.to_string_lossy()))
            .collect();
        f.write_str(&rendered.join(" "))
    }
}

fn quote_for_display(part: &str) -> String {
    let plain = !part.is_empty()
        && part
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_=./:+,@%".contains(c));
    if plain {
        part.to_string()
    } else {
        format!("'{}'", part.replace('\'', r"'\''"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "code", rename_all = "snake_case")]
pub enum ProcessStatus {
    Exited(i32),
    Signaled(i32),
    LaunchFailed,
    TimedOut,
    Cancelled,
}

impl ProcessStatus {
    pub fn exit_code(&self) -> i32 {
        match self {
            ProcessStatus::Exited(code) => *code,
            ProcessStatus::Signaled(signal) => 128 + signal,
            ProcessStatus::LaunchFailed => exit_code::LAUNCH_FAILURE,
            ProcessStatus::TimedOut => exit_code::TIMEOUT,
            ProcessStatus::Cancelled => exit_code::CANCELLED,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessResult {
    pub status: ProcessStatus,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
    pub diagnostic: Option<String>,
}

impl ProcessResult {
    pub fn success(&self) -> bool {
        self.status == ProcessStatus::Exited(0)
    }

    pub fn exit_code(&self) -> i32 {
        self.status.exit_code()
    }
}

enum Waited {
    Exited(std::io::Result<ExitStatus>),
    TimedOut,
    Cancelled,
}

/// Runs `command` in `working_dir`, bounded by `timeout`.
pub async fn run_command(command: &CommandSpec, working_dir: &Path, timeout: Duration) -> ProcessResult {
    run_command_cancellable(command, working_dir, timeout, &CancellationToken::new()).await
}

/// Runs `command` until it exits, `timeout` elapses, or `cancel` fires.
///
/// Never fails: launch errors, timeouts and cancellation are reported through
/// [`ProcessStatus`]. On timeout or cancellation the child's whole process
/// group is killed and the optional cleanup command is run before returning.
pub async fn run_command_cancellable(
    command: &CommandSpec,
    working_dir: &Path,
    timeout: Duration,
    cancel: &CancellationToken,
) -> ProcessResult {
    debug!("Running command: {} (in {:?}, timeout {:?})", command, working_dir, timeout);

    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .current_dir(working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let start = Instant::now();
    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            warn!("Failed to launch '{}': {}", command.program.to_string_lossy(), e);
            return ProcessResult {
                status: ProcessStatus::LaunchFailed,
                stdout: String::new(),
                stderr: String::new(),
                elapsed: start.elapsed(),
                diagnostic: Some(format!(
                    "Failed to launch '{}': {}. Is it installed and in your PATH?",
                    command.program.to_string_lossy(),
                    e
                )),
            };
        }
    };

    let pid = child.id();
    let stdout_task = tokio::spawn(drain(child.stdout.take()));
    let stderr_task = tokio::spawn(drain(child.stderr.take()));

    let waited = tokio::select! {
        status = child.wait() => Waited::Exited(status),
        _ = tokio::time::sleep(timeout) => Waited::TimedOut,
        _ = cancel.cancelled() => Waited::Cancelled,
    };

    let (status, diagnostic) = match waited {
        Waited::Exited(Ok(status)) => (exit_status(status), None),
        Waited::Exited(Err(e)) => {
            // The child may still be running; treat it like any other abandoned process.
            terminate(&mut child, pid, command, working_dir).await;
            (
                ProcessStatus::LaunchFailed,
                Some(format!("Failed to wait for '{}': {}", command.program.to_string_lossy(), e)),
            )
        }
        Waited::TimedOut => {
            terminate(&mut child, pid, command, working_dir).await;
            (
                ProcessStatus::TimedOut,
                Some(format!(
                    "Process timed out after {:.1}s (limit {}s) and was killed",
                    start.elapsed().as_secs_f64(),
                    timeout.as_secs_f64()
                )),
            )
        }
        Waited::Cancelled => {
            terminate(&mut child, pid, command, working_dir).await;
            (ProcessStatus::Cancelled, Some("Process was cancelled and killed".to_string()))
        }
    };

    let stdout = collect(stdout_task).await;
    let stderr = collect(stderr_task).await;
    let elapsed = start.elapsed();

    debug!(
        "Command '{}' finished with {:?} after {:?}",
        command.program.to_string_lossy(),
        status,
        elapsed
    );

    ProcessResult {
        status,
        stdout,
        stderr,
        elapsed,
        diagnostic,
    }
}

fn exit_status(status: ExitStatus) -> ProcessStatus {
    if let Some(code) = status.code() {
        return ProcessStatus::Exited(code);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return ProcessStatus::Signaled(signal);
        }
    }
    ProcessStatus::Exited(exit_code::INTERNAL_ERROR)
}

async fn terminate(
    child: &mut tokio::process::Child,
    pid: Option<u32>,
    command: &CommandSpec,
    working_dir: &Path,
) {
    if let Some(pid) = pid {
        kill_process_group(pid);
    }
    if let Err(e) = child.kill().await {
        debug!("Child already gone while killing: {}", e);
    }

    if let Some(cleanup) = &command.cleanup {
        run_cleanup(cleanup, working_dir).await;
    }
}

async fn run_cleanup(cleanup: &CommandSpec, working_dir: &Path) {
    debug!("Running cleanup command: {}", cleanup);
    let output = Command::new(&cleanup.program)
        .args(&cleanup.args)
        .current_dir(working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    match tokio::time::timeout(CLEANUP_TIMEOUT, output).await {
        Ok(Ok(output)) if output.status.success() => {}
        Ok(Ok(output)) => warn!(
            "Cleanup command '{}' failed with {}: {}",
            cleanup,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        ),
        Ok(Err(e)) => warn!("Failed to launch cleanup command '{}': {}", cleanup, e),
        Err(_) => warn!("Cleanup command '{}' timed out after {:?}", cleanup, CLEANUP_TIMEOUT),
    }
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!("Failed to kill process group {}: {}", pid, e),
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

async fn drain<R: AsyncRead + Unpin>(reader: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        if let Err(e) = reader.read_to_end(&mut buf).await {
            debug!("Stopped reading child output: {}", e);
        }
    }
    buf
}

async fn collect(mut task: JoinHandle<Vec<u8>>) -> String {
    let drained = tokio::time::timeout(PIPE_DRAIN_GRACE, &mut task).await;
    if drained.is_err() {
        task.abort();
    }
    match drained {
        Ok(Ok(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
        Ok(Err(e)) => {
            warn!("Output reader task failed: {}", e);
            String::new()
        }
        Err(_) => {
            warn!("Output pipe still open {:?} after exit, giving up", PIPE_DRAIN_GRACE);
            String::new()
        }
    }
}
