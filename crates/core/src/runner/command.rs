//! Production worker: an external program launched per request.
//!
//! The command line is `<program> <args...> <input_path> <output_dir>`, the
//! calling convention of the analysis script. The worker additionally sees
//! `JOB_SCOPE`, `JOB_INPUT_PATH` and `JOB_OUTPUT_DIR` in its environment.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::process::Command;

use super::subprocess;
use super::{JobRunner, ProcessResult, RunRequest, RunnerError};

/// Spawns the configured analysis program, one child process per call.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    program: String,
    args: Vec<String>,
    working_directory: Option<PathBuf>,
}

impl CommandRunner {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            working_directory: None,
        }
    }

    /// Run the worker from `dir` instead of the server's working directory.
    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn build(&self, request: &RunRequest) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(&request.input_path)
            .arg(&request.output_dir)
            .env("JOB_SCOPE", request.scope.token())
            .env("JOB_INPUT_PATH", &request.input_path)
            .env("JOB_OUTPUT_DIR", &request.output_dir);

        if let Some(dir) = &self.working_directory {
            cmd.current_dir(dir);
        }
        cmd
    }
}

#[async_trait]
impl JobRunner for CommandRunner {
    async fn run(&self, request: RunRequest) -> Result<ProcessResult, RunnerError> {
        let mut cmd = self.build(&request);
        subprocess::run_command(&mut cmd, request.timeout).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
