//! Subprocess execution for one job: spawns a child via [`tokio::process::Command`],
//! enforces a wall-clock timeout, captures bounded stdout/stderr, and exposes a
//! [`Executor::cancel`] hook so a `Worker` can terminate an in-flight child on
//! shutdown.
//!
//! Only one child is expected to be in flight per `Executor` at a time; the in-flight
//! pid is cleared on every exit path (normal, timeout, spawn error, cancellation) via
//! an RAII guard, so nothing leaks across iterations.

use std::process::Stdio;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::Notify;

/// Cap on captured bytes per stream, so a runaway, chatty command can't grow a
/// job's stored output without bound.
pub const MAX_CAPTURED_BYTES: usize = 64 * 1024;

/// Grace period between a `SIGTERM` and a forced `SIGKILL` on timeout/cancellation.
const KILL_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("failed to spawn command: {0}")]
    Spawn(String),
    #[error("command exceeded its timeout")]
    Timeout,
    #[error("command was canceled")]
    Canceled,
}

/// The outcome of one completed (non-timed-out, non-canceled) execution.
#[derive(Debug, Clone)]
pub struct ExecReport {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ExecReport {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// The `Job.output` storage convention: `"STDOUT:\n<out>\nSTDERR:\n<err>"`.
    pub fn format_output(&self) -> String {
        format!("STDOUT:\n{}\nSTDERR:\n{}", self.stdout, self.stderr)
    }
}

/// Format an `Error: <detail>` output string for spawn/timeout/cancel failures.
pub fn format_error_output(err: &ExecError) -> String {
    match err {
        ExecError::Timeout => "Error: timeout".to_string(),
        other => format!("Error: {other}"),
    }
}

/// Runs one command at a time, enforcing `timeout` and exposing [`cancel`](Executor::cancel).
pub struct Executor {
    current_pid: AtomicU32,
    cancel_notify: Notify,
}

const NO_PID: u32 = 0;

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor {
    pub fn new() -> Self {
        Self {
            current_pid: AtomicU32::new(NO_PID),
            cancel_notify: Notify::new(),
        }
    }

    /// Run `command` to completion, tokenizing it as argv unless `shell_mode` is set
    /// (in which case it goes through the system shell — a known footgun, opt-in
    /// only). `timeout_secs`, if set, is a wall-clock limit measured from spawn.
    pub async fn run(
        &self,
        command: &str,
        timeout_secs: Option<i64>,
        shell_mode: bool,
    ) -> Result<ExecReport, ExecError> {
        let mut cmd = build_command(command, shell_mode)?;
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| ExecError::Spawn(format!("{command}: {e}")))?;

        if let Some(pid) = child.id() {
            self.current_pid.store(pid, Ordering::SeqCst);
        }
        let _clear_pid = ClearPidGuard(self);

        let mut stdout_pipe = child.stdout.take().expect("stdout was piped");
        let mut stderr_pipe = child.stderr.take().expect("stderr was piped");
        let stdout_task = tokio::spawn(async move { read_capped(&mut stdout_pipe).await });
        let stderr_task = tokio::spawn(async move { read_capped(&mut stderr_pipe).await });

        let timeout_fut = async {
            match timeout_secs {
                Some(secs) => tokio::time::sleep(Duration::from_secs(secs.max(0) as u64)).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            status = child.wait() => {
                let stdout = stdout_task.await.unwrap_or_default();
                let stderr = stderr_task.await.unwrap_or_default();
                let status = status.map_err(|e| ExecError::Spawn(e.to_string()))?;
                Ok(ExecReport {
                    exit_code: status.code(),
                    stdout,
                    stderr,
                })
            }
            _ = timeout_fut => {
                terminate_then_kill(&mut child).await;
                stdout_task.abort();
                stderr_task.abort();
                Err(ExecError::Timeout)
            }
            _ = self.cancel_notify.notified() => {
                terminate_then_kill(&mut child).await;
                stdout_task.abort();
                stderr_task.abort();
                Err(ExecError::Canceled)
            }
        }
    }

    /// Signal the in-flight child (if any) to terminate. Used on graceful shutdown.
    /// A no-op if nothing is currently running.
    pub fn cancel(&self) {
        self.cancel_notify.notify_one();
    }
}

struct ClearPidGuard<'a>(&'a Executor);

impl Drop for ClearPidGuard<'_> {
    fn drop(&mut self) {
        self.0.current_pid.store(NO_PID, Ordering::SeqCst);
    }
}

async fn terminate_then_kill(child: &mut Child) {
    if let Some(pid) = child.id() {
        send_sigterm(pid);
    }
    if tokio::time::timeout(KILL_GRACE, child.wait()).await.is_err() {
        let _ = child.kill().await;
    }
}

fn build_command(command: &str, shell_mode: bool) -> Result<Command, ExecError> {
    if shell_mode {
        let mut cmd = Command::new(shell_program());
        cmd.arg(shell_flag()).arg(command);
        return Ok(cmd);
    }

    let tokens = shell_words::split(command)
        .map_err(|e| ExecError::Spawn(format!("failed to tokenize command: {e}")))?;
    let (program, args) = tokens
        .split_first()
        .ok_or_else(|| ExecError::Spawn("empty command".to_string()))?;

    let mut cmd = Command::new(program);
    cmd.args(args);
    Ok(cmd)
}

#[cfg(unix)]
fn shell_program() -> &'static str {
    "/bin/sh"
}

#[cfg(unix)]
fn shell_flag() -> &'static str {
    "-c"
}

#[cfg(windows)]
fn shell_program() -> &'static str {
    "cmd"
}

#[cfg(windows)]
fn shell_flag() -> &'static str {
    "/C"
}

#[cfg(unix)]
fn send_sigterm(pid: u32) {
    // SAFETY: pid is a live child's pid we own; kill(2) with SIGTERM is the
    // standard graceful-termination request.
    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGTERM);
    }
}

#[cfg(not(unix))]
fn send_sigterm(_pid: u32) {}

async fn read_capped<R: tokio::io::AsyncRead + Unpin>(reader: &mut R) -> String {
    let mut buf = Vec::with_capacity(8192.min(MAX_CAPTURED_BYTES));
    let mut chunk = [0u8; 8192];
    let mut truncated = false;
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                if buf.len() < MAX_CAPTURED_BYTES {
                    let remaining = MAX_CAPTURED_BYTES - buf.len();
                    let take = remaining.min(n);
                    buf.extend_from_slice(&chunk[..take]);
                    if take < n {
                        truncated = true;
                    }
                } else {
                    truncated = true;
                }
            }
            Err(_) => break,
        }
    }
    let mut out = String::from_utf8_lossy(&buf).into_owned();
    if truncated {
        out.push_str("\n... [truncated]");
    }
    out
}
