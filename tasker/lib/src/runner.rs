//! Sub-command process runner.
//!
//! A [`ProcessRunner`] executes one sub-command as a child process and
//! streams both of its output pipes, line by line, into an [`EventSink`].
//! How the child is launched depends on the host platform and is captured
//! once in a [`ProcessLauncher`].

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::RunnerError;
use crate::executor::EventSink;

/// Exit code reported when a child process could not be spawned, or was
/// terminated without an exit code.
pub const SPAWN_FAILURE_EXIT_CODE: i32 = -1;

/// Seconds slept by a bare `pause` sub-command.
pub const DEFAULT_PAUSE_SECS: u64 = 3;

/// Keyword of the built-in delay sub-command.
const PAUSE_KEYWORD: &str = "pause";

/// Which output pipe a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// How a sub-command string is turned into a child process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessLauncher {
    /// Hand the whole string to the host shell (`cmd /C`). Used on Windows.
    Shell,
    /// Launch `program -c <subcommand>` as an explicit argument vector.
    /// Used on POSIX hosts with `bash`.
    Argv {
        /// The interpreter to run.
        program: String,
    },
}

impl ProcessLauncher {
    /// Picks the launcher for the platform this binary was built for.
    pub fn detect() -> Self {
        if cfg!(windows) {
            ProcessLauncher::Shell
        } else {
            ProcessLauncher::bash()
        }
    }

    /// The POSIX launcher, `bash -c <subcommand>`.
    pub fn bash() -> Self {
        ProcessLauncher::Argv {
            program: "bash".to_string(),
        }
    }

    fn command(&self, subcommand: &str) -> Command {
        match self {
            ProcessLauncher::Shell => shell_command(subcommand),
            ProcessLauncher::Argv { program } => {
                let mut cmd = Command::new(program);
                cmd.arg("-c").arg(subcommand);
                cmd
            }
        }
    }
}

impl Default for ProcessLauncher {
    fn default() -> Self {
        Self::detect()
    }
}

#[cfg(windows)]
fn shell_command(subcommand: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").raw_arg(subcommand);
    cmd
}

#[cfg(not(windows))]
fn shell_command(subcommand: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(subcommand);
    cmd
}

/// Parses a `pause [seconds]` sub-command.
///
/// Returns `None` when `subcommand` is not a pause. A missing or unparsable
/// argument yields `default_secs`.
///
/// ## Examples
///
/// ```
/// use tasker_lib::pause_seconds;
///
/// assert_eq!(pause_seconds("pause 2", 3), Some(2));
/// assert_eq!(pause_seconds("PAUSE", 3), Some(3));
/// assert_eq!(pause_seconds("pause soon", 3), Some(3));
/// assert_eq!(pause_seconds("pauser 2", 3), None);
/// ```
pub fn pause_seconds(subcommand: &str, default_secs: u64) -> Option<u64> {
    pause_argument(subcommand).map(|secs| secs.unwrap_or(default_secs))
}

/// Like [`pause_seconds`], with a default that may be sub-second.
///
/// ## Examples
///
/// ```
/// use std::time::Duration;
/// use tasker_lib::pause_duration;
///
/// let default = Duration::from_millis(500);
/// assert_eq!(pause_duration("pause", default), Some(default));
/// assert_eq!(pause_duration("pause 2", default), Some(Duration::from_secs(2)));
/// assert_eq!(pause_duration("echo pause", default), None);
/// ```
pub fn pause_duration(subcommand: &str, default: Duration) -> Option<Duration> {
    pause_argument(subcommand).map(|secs| secs.map_or(default, Duration::from_secs))
}

/// `None` when not a pause; `Some(None)` when the argument is missing or
/// unparsable.
fn pause_argument(subcommand: &str) -> Option<Option<u64>> {
    let mut tokens = subcommand.split_whitespace();
    let keyword = tokens.next()?;
    if !keyword.eq_ignore_ascii_case(PAUSE_KEYWORD) {
        return None;
    }
    Some(tokens.next().and_then(|arg| arg.parse().ok()))
}

/// Runs sub-commands as child processes.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    launcher: ProcessLauncher,
    default_pause: Duration,
}

impl ProcessRunner {
    #[must_use]
    pub fn new(launcher: ProcessLauncher, default_pause: Duration) -> Self {
        Self {
            launcher,
            default_pause,
        }
    }

    pub fn launcher(&self) -> &ProcessLauncher {
        &self.launcher
    }

    /// Runs one sub-command to completion and returns its exit code.
    ///
    /// Output lines are forwarded to `sink` as they arrive. The call returns
    /// once the child has exited and both pipes are drained.
    ///
    /// A spawn failure is logged and reported as [`SPAWN_FAILURE_EXIT_CODE`].
    ///
    /// ## Errors
    ///
    /// Returns an error if waiting on the child fails or an output reader
    /// does not finish cleanly.
    pub async fn run(
        &self,
        subcommand: &str,
        sink: &Arc<dyn EventSink>,
    ) -> Result<i32, RunnerError> {
        if let Some(pause) = pause_duration(subcommand, self.default_pause) {
            sink.on_log(&format!("pausing for {} second(s)", pause.as_secs_f64()));
            debug!(?pause, "pause sub-command");
            tokio::time::sleep(pause).await;
            return Ok(0);
        }

        let mut child = match self
            .launcher
            .command(subcommand)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                debug!(error = %e, "spawn failed");
                sink.on_output(&e.to_string(), OutputStream::Stderr);
                return Ok(SPAWN_FAILURE_EXIT_CODE);
            }
        };
        debug!(pid = child.id(), subcommand, "spawned");

        let stdout = child
            .stdout
            .take()
            .map(|pipe| forward_lines(pipe, OutputStream::Stdout, Arc::clone(sink)));
        let stderr = child
            .stderr
            .take()
            .map(|pipe| forward_lines(pipe, OutputStream::Stderr, Arc::clone(sink)));

        let status = child.wait().await;

        for reader in [stdout, stderr].into_iter().flatten() {
            reader
                .await
                .map_err(|e| RunnerError::Reader(e.to_string()))?;
        }

        let status = status.map_err(RunnerError::Wait)?;
        let code = status.code().unwrap_or(SPAWN_FAILURE_EXIT_CODE);
        debug!(code, "process exited");
        Ok(code)
    }
}

/// Spawns a reader that forwards each trimmed, non-empty line of `pipe`.
fn forward_lines<R>(pipe: R, stream: OutputStream, sink: Arc<dyn EventSink>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(pipe);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    let line = line.trim();
                    if !line.is_empty() {
                        sink.on_output(line, stream);
                    }
                }
                Err(e) => {
                    sink.on_output(&e.to_string(), OutputStream::Stderr);
                    break;
                }
            }
        }
    })
}
