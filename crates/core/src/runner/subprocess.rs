//! Child process supervision: spawn, capture, timeout, kill.
//!
//! [`run_command`] owns the child for its whole lifetime. `kill_on_drop` is
//! set so a dropped future (cancelled request) kills the worker; on timeout
//! the child is killed and reaped before returning.

use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use super::{ProcessResult, RunnerError};

/// Maximum stdout or stderr size captured per stream (10 MiB).
const MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// Spawn `cmd`, capture its output and enforce `timeout`.
///
/// The caller sets program, arguments and environment. Stdin is closed.
pub async fn run_command(cmd: &mut Command, timeout: Duration) -> Result<ProcessResult, RunnerError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let start = Instant::now();
    // One deadline bounds both the wait and the pipe drains.
    let deadline = tokio::time::Instant::now() + timeout;

    let mut child = cmd.spawn().map_err(RunnerError::Spawn)?;
    tracing::debug!(pid = ?child.id(), "Analysis worker spawned");

    // Read the pipes in their own tasks so `child.wait()` can borrow the child.
    let mut stdout_task = tokio::spawn(read_stream(child.stdout.take()));
    let mut stderr_task = tokio::spawn(read_stream(child.stderr.take()));

    let status = match tokio::time::timeout_at(deadline, child.wait()).await {
        Ok(Ok(status)) => status,
        Ok(Err(e)) => {
            stdout_task.abort();
            stderr_task.abort();
            return Err(RunnerError::Io(e));
        }
        Err(_elapsed) => {
            if let Err(e) = child.start_kill() {
                tracing::warn!(error = %e, "Failed to signal timed-out analysis worker");
            }
            // Reap so the worker is gone before we report the timeout.
            let _ = child.wait().await;
            // Orphaned grandchildren may still hold the pipes open.
            stdout_task.abort();
            stderr_task.abort();
            return Err(RunnerError::Timeout {
                elapsed_ms: start.elapsed().as_millis() as u64,
            });
        }
    };

    // A descendant that outlives the worker keeps the pipes open.
    let drained = tokio::time::timeout_at(deadline, async {
        ((&mut stdout_task).await, (&mut stderr_task).await)
    })
    .await;
    let (stdout, stderr) = match drained {
        Ok((out, err)) => (out.unwrap_or_default(), err.unwrap_or_default()),
        Err(_elapsed) => {
            stdout_task.abort();
            stderr_task.abort();
            tracing::warn!("Analysis worker exited but a descendant still holds its output pipes");
            return Err(RunnerError::Timeout {
                elapsed_ms: start.elapsed().as_millis() as u64,
            });
        }
    };

    let duration_ms = start.elapsed().as_millis() as u64;
    let stdout = String::from_utf8_lossy(&stdout).into_owned();
    let stderr = String::from_utf8_lossy(&stderr).into_owned();
    let exit_code = status.code().unwrap_or(-1);

    if !status.success() {
        return Err(RunnerError::ExecutionFailed {
            exit_code,
            stderr: stderr.trim().to_string(),
        });
    }

    Ok(ProcessResult {
        exit_code,
        stdout,
        stderr,
        duration_ms,
    })
}

/// Read an output stream to EOF, keeping at most [`MAX_OUTPUT_BYTES`].
///
/// Bytes past the cap are drained and discarded so the worker never sees a
/// closed pipe.
async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = (&mut h)
            .take(MAX_OUTPUT_BYTES as u64)
            .read_to_end(&mut buf)
            .await;
        let _ = tokio::io::copy(&mut h, &mut tokio::io::sink()).await;
    }
    buf
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[tokio::test]
    async fn captures_both_streams() {
        let mut cmd = Command::new("bash");
        cmd.args(["-c", "echo out; echo err >&2"]);
        let result = run_command(&mut cmd, Duration::from_secs(5))
            .await
            .expect("run");
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout.trim(), "out");
        assert_eq!(result.stderr.trim(), "err");
    }

    #[tokio::test]
    async fn stdin_is_closed() {
        let mut cmd = Command::new("bash");
        cmd.args(["-c", "cat; echo finished"]);
        let result = run_command(&mut cmd, Duration::from_secs(5))
            .await
            .expect("run");
        assert_eq!(result.stdout.trim(), "finished");
    }

    #[tokio::test]
    async fn signal_death_reports_negative_exit_code() {
        let mut cmd = Command::new("bash");
        cmd.args(["-c", "kill -9 $$"]);
        let result = run_command(&mut cmd, Duration::from_secs(5)).await;
        assert_matches!(result, Err(RunnerError::ExecutionFailed { exit_code: -1, .. }));
    }

    #[tokio::test]
    async fn descendant_holding_pipes_is_bounded_by_timeout() {
        let mut cmd = Command::new("bash");
        cmd.args(["-c", "sleep 5 & echo started"]);

        let started = Instant::now();
        let result = run_command(&mut cmd, Duration::from_millis(500)).await;

        assert_matches!(result, Err(RunnerError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn oversized_output_is_truncated_not_failed() {
        let mut cmd = Command::new("bash");
        cmd.args(["-c", "head -c 12582912 /dev/zero; echo done >&2"]);

        let result = run_command(&mut cmd, Duration::from_secs(10))
            .await
            .expect("run");

        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout.len(), MAX_OUTPUT_BYTES);
        assert_eq!(result.stderr.trim(), "done");
    }
}
