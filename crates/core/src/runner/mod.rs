//! External analysis worker invocation.
//!
//! The worker is opaque: it receives an input path and an output directory,
//! writes artifacts there, and exits. [`JobRunner`] is the capability the
//! orchestrator depends on, so tests can swap in an in-process worker.
//! [`command::CommandRunner`] is the production implementation that spawns
//! one child process per call.

pub mod command;
pub mod subprocess;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use crate::scope::JobScope;

/// One worker invocation.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Staged upload the worker analyses.
    pub input_path: PathBuf,
    /// Scope-private directory the worker writes its artifacts into.
    pub output_dir: PathBuf,
    /// Scope the output directory belongs to.
    pub scope: JobScope,
    /// Maximum wall-clock time before the worker is killed.
    pub timeout: Duration,
}

/// Captured output of a worker that exited successfully.
#[derive(Debug, Clone)]
pub struct ProcessResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

/// Why a worker invocation did not complete successfully.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("failed to spawn analysis worker: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("analysis worker timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("analysis worker exited with code {exit_code}: {stderr}")]
    ExecutionFailed { exit_code: i32, stderr: String },

    #[error("I/O error while supervising analysis worker: {0}")]
    Io(#[source] std::io::Error),
}

/// Runs the analysis worker for one request.
///
/// Implementations must not leave work running after `run` returns or after
/// the returned future is dropped, and must never report success for an
/// invocation that exceeded `request.timeout`.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, request: RunRequest) -> Result<ProcessResult, RunnerError>;
}
