// ABOUTME: runs one approved command through the shell with bounded runtime and output.
// ABOUTME: encodes every failure mode in the returned outcome instead of raising it.

use std::path::Path;
use std::process::Stdio;

use cmdgate_common::{ActionError, ErrorCode};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::ExecConfig;

// POSIX shells exit with 127 when the command word cannot be found
const SHELL_NOT_FOUND_STATUS: i32 = 127;
const LAUNCH_FAILED_EXIT_CODE: i32 = -1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutcome {
    pub stdout: String,
    pub stdout_truncated: bool,
    pub stderr: String,
    pub stderr_truncated: bool,
    /// `None` when the command timed out. `-1` when it could not be launched or the shell
    /// reported the command word as not found.
    pub exit_code: Option<i32>,
    pub success: bool,
    pub error: Option<ActionError>,
}

impl ExecOutcome {
    pub(crate) fn failed(exit_code: Option<i32>, code: ErrorCode, message: String) -> Self {
        Self {
            stdout: String::new(),
            stdout_truncated: false,
            stderr: String::new(),
            stderr_truncated: false,
            exit_code,
            success: false,
            error: Some(ActionError { code, message }),
        }
    }

    /// Text attached to the command as its `output`.
    ///
    /// Successful runs report stdout alone. Failed runs append stderr and the error.
    pub fn command_output(&self) -> String {
        if self.success {
            return self.stdout.clone();
        }

        let mut parts: Vec<String> = Vec::new();
        if !self.stdout.is_empty() {
            parts.push(self.stdout.clone());
        }
        if !self.stderr.is_empty() {
            parts.push(self.stderr.clone());
        }
        match (&self.error, self.exit_code) {
            (Some(err), _) => parts.push(format!("Error: {}", err.message)),
            (None, Some(code)) => parts.push(format!("Error: command exited with status {code}")),
            (None, None) => {}
        }

        let mut out = String::new();
        for part in parts {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&part);
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct Executor {
    config: ExecConfig,
}

impl Executor {
    pub fn new(config: ExecConfig) -> Self {
        Self { config }
    }

    pub async fn run(&self, command_text: &str, cwd: &Path) -> ExecOutcome {
        let mut cmd = Command::new(&self.config.shell);
        cmd.arg("-c")
            .arg(command_text)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                warn!(command = %command_text, error = %err, "spawn failed");
                let code = if err.kind() == std::io::ErrorKind::NotFound {
                    ErrorCode::ExecutableNotFound
                } else {
                    ErrorCode::ExecutionFailed
                };
                return ExecOutcome::failed(
                    Some(LAUNCH_FAILED_EXIT_CODE),
                    code,
                    format!("launch failed: {err}"),
                );
            }
        };
        let pid = child.id();
        debug!(command = %command_text, pid = ?pid, cwd = %cwd.display(), "command spawned");

        let max = self.config.max_output_bytes;
        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();
        let mut stdout_buf = Vec::new();
        let mut stderr_buf = Vec::new();

        // None when the time limit hit first
        let finished = {
            let wait = async {
                let (status, out, err) = tokio::join!(
                    child.wait(),
                    read_capped(stdout_pipe, max, &mut stdout_buf),
                    read_capped(stderr_pipe, max, &mut stderr_buf),
                );
                out?;
                err?;
                status
            };
            match self.config.timeout {
                Some(limit) => tokio::time::timeout(limit, wait).await.ok(),
                None => Some(wait.await),
            }
        };

        let (stdout, stdout_truncated) = truncate_bytes(&stdout_buf, max);
        let (stderr, stderr_truncated) = truncate_bytes(&stderr_buf, max);

        let status = match finished {
            Some(Ok(status)) => status,
            Some(Err(err)) => {
                return ExecOutcome::failed(
                    Some(LAUNCH_FAILED_EXIT_CODE),
                    ErrorCode::ExecutionFailed,
                    format!("wait failed: {err}"),
                )
            }
            None => {
                kill_process_group(pid);
                let limit = self.config.timeout.unwrap_or_default();
                warn!(command = %command_text, timeout_sec = limit.as_secs(), "command timed out");
                return ExecOutcome {
                    stdout,
                    stdout_truncated,
                    stderr,
                    stderr_truncated,
                    exit_code: None,
                    success: false,
                    error: Some(ActionError {
                        code: ErrorCode::ExecutionTimeout,
                        message: format!("command timed out after {limit:?}"),
                    }),
                };
            }
        };

        let code = status.code();
        if code == Some(SHELL_NOT_FOUND_STATUS) && is_not_found_diagnostic(&stderr) {
            let message = format!("command not found: {}", stderr.trim());
            return ExecOutcome {
                stdout,
                stdout_truncated,
                stderr,
                stderr_truncated,
                exit_code: Some(LAUNCH_FAILED_EXIT_CODE),
                success: false,
                error: Some(ActionError {
                    code: ErrorCode::ExecutableNotFound,
                    message,
                }),
            };
        }

        ExecOutcome {
            success: status.success(),
            // a signal-terminated child has no exit status
            exit_code: code.or(Some(LAUNCH_FAILED_EXIT_CODE)),
            stdout,
            stdout_truncated,
            stderr,
            stderr_truncated,
            error: None,
        }
    }
}

/// Status 127 alone is ambiguous since scripts may `exit 127` themselves, so the shell's
/// own diagnostic must be on stderr too. dash and busybox print `foo: not found`, bash
/// prints `foo: command not found`.
fn is_not_found_diagnostic(stderr: &str) -> bool {
    stderr.lines().any(|line| line.trim_end().ends_with("not found"))
}

/// Keeps at most `max + 1` bytes of a pipe and discards the rest so the child never blocks
/// on a full pipe.
async fn read_capped<R>(pipe: Option<R>, max: usize, buf: &mut Vec<u8>) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let Some(mut pipe) = pipe else {
        return Ok(());
    };
    let cap = u64::try_from(max).unwrap_or(u64::MAX).saturating_add(1);
    (&mut pipe).take(cap).read_to_end(buf).await?;
    tokio::io::copy(&mut pipe, &mut tokio::io::sink()).await?;
    Ok(())
}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    if let Some(pid) = pid {
        // the child leads its own group, see process_group(0)
        let rc = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
        if rc != 0 {
            debug!(pid, "process group already gone");
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

fn truncate_bytes(bytes: &[u8], max: usize) -> (String, bool) {
    if bytes.len() <= max {
        return (String::from_utf8_lossy(bytes).to_string(), false);
    }

    let mut out = String::from_utf8_lossy(&bytes[..max]).to_string();
    out.push_str("\n[truncated]\n");
    (out, true)
}
