//! Per-request job orchestration.
//!
//! Drives one submission through
//! `Received -> ScopeAllocated -> Running -> Resolving -> Parsed -> Cleaned -> Done`
//! (or `Failed` / `TimedOut` instead of resolving). Every accepted request
//! gets its own [`JobScope`], so concurrent jobs share the results directory
//! without locks: each one only ever resolves and releases its own output.
//!
//! Cleanup is owned by a [`ScopeGuard`]. The normal path releases it
//! explicitly; if the request future is dropped mid-flight (client gone,
//! request timeout) the guard's `Drop` removes the same files synchronously
//! and the worker is killed by the runner's `kill_on_drop`.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::Instrument;

use crate::artifacts::store::{remove_file_quietly, remove_file_quietly_blocking};
use crate::artifacts::{Artifact, ArtifactCategory, ArtifactPattern, ArtifactStore};
use crate::derived;
use crate::media::{MediaPolicy, UploadedMedium};
use crate::outcome::{JobOutcome, JobResult};
use crate::runner::{JobRunner, RunRequest, RunnerError};
use crate::scope::JobScope;

/// Default result pattern: any JSON document the worker leaves in its scope.
pub const DEFAULT_RESULT_PATTERN: &str = "*.json";

// ---------------------------------------------------------------------------
// Configuration and errors
// ---------------------------------------------------------------------------

/// Settings for [`JobOrchestrator`].
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Where uploaded media are staged.
    pub upload_dir: PathBuf,
    /// Shared results directory; scopes are created beneath it.
    pub results_dir: PathBuf,
    /// Maximum worker runtime before it is killed.
    pub job_timeout: Duration,
    /// Declared media types the worker accepts.
    pub media_policy: MediaPolicy,
    /// File-name pattern of the worker's result document.
    pub result_pattern: ArtifactPattern,
    /// Publish summary/dataset artifacts for per-second results.
    pub publish_derived: bool,
}

/// Rejections that happen before a job outcome exists.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    /// Declared type is not on the allow-list. No scope, files or process.
    #[error("Unsupported media type '{media_type}'")]
    UnsupportedMedia { media_type: String },

    /// The upload or the scope directory could not be written.
    #[error("Failed to stage upload: {0}")]
    Staging(#[source] std::io::Error),
}

// ---------------------------------------------------------------------------
// Job states
// ---------------------------------------------------------------------------

/// Lifecycle states of one request, used for tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Received,
    ScopeAllocated,
    Running,
    Resolving,
    Parsed,
    Failed,
    TimedOut,
    Cleaned,
    Done,
}

impl JobState {
    pub fn label(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::ScopeAllocated => "scope_allocated",
            Self::Running => "running",
            Self::Resolving => "resolving",
            Self::Parsed => "parsed",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
            Self::Cleaned => "cleaned",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

fn enter(state: JobState) {
    tracing::debug!(state = %state, "Job state transition");
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Counters {
    started: AtomicU64,
    cleaned: AtomicU64,
}

/// Point-in-time view of scope bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobStats {
    /// Scopes allocated since startup.
    pub started: u64,
    /// Scopes whose cleanup has run.
    pub cleaned: u64,
}

impl JobStats {
    /// Jobs currently holding a scope.
    pub fn active(&self) -> u64 {
        self.started.saturating_sub(self.cleaned)
    }
}

// ---------------------------------------------------------------------------
// Scope guard
// ---------------------------------------------------------------------------

/// Owns everything a request created and releases it exactly once.
struct ScopeGuard {
    store: ArtifactStore,
    scope: JobScope,
    input: Option<PathBuf>,
    artifact: Option<Artifact>,
    counters: Arc<Counters>,
    released: bool,
}

impl ScopeGuard {
    fn new(store: ArtifactStore, scope: JobScope, counters: Arc<Counters>) -> Self {
        counters.started.fetch_add(1, Ordering::SeqCst);
        Self {
            store,
            scope,
            input: None,
            artifact: None,
            counters,
            released: false,
        }
    }

    fn track_input(&mut self, path: PathBuf) {
        self.input = Some(path);
    }

    fn track_artifact(&mut self, artifact: Artifact) {
        self.artifact = Some(artifact);
    }

    /// Remove the staged upload, the resolved artifact, the scope directory
    /// and any root file carrying the scope token. Missing files are ignored.
    async fn release(mut self) {
        if let Some(input) = self.input.take() {
            remove_file_quietly(&input).await;
        }
        if let Some(artifact) = self.artifact.take() {
            self.store.release(&artifact).await;
        }
        self.store.release_scope(&self.scope).await;
        self.finish();
    }

    fn finish(&mut self) {
        self.released = true;
        self.counters.cleaned.fetch_add(1, Ordering::SeqCst);
        enter(JobState::Cleaned);
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        tracing::warn!(scope = %self.scope, "Job abandoned before completion, cleaning up");
        if let Some(input) = self.input.take() {
            remove_file_quietly_blocking(&input);
        }
        if let Some(artifact) = self.artifact.take() {
            remove_file_quietly_blocking(&artifact.path);
        }
        self.store.release_scope_blocking(&self.scope);
        self.finish();
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Coordinates the job runner and the artifact store for each request.
///
/// Stateless between requests apart from counters; share it behind an
/// `Arc` and call [`JobOrchestrator::submit`] concurrently.
pub struct JobOrchestrator {
    config: OrchestratorConfig,
    store: ArtifactStore,
    runner: Arc<dyn JobRunner>,
    counters: Arc<Counters>,
}

impl JobOrchestrator {
    pub fn new(config: OrchestratorConfig, runner: Arc<dyn JobRunner>) -> Self {
        let store = ArtifactStore::new(config.results_dir.clone());
        Self {
            config,
            store,
            runner,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn stats(&self) -> JobStats {
        JobStats {
            started: self.counters.started.load(Ordering::SeqCst),
            cleaned: self.counters.cleaned.load(Ordering::SeqCst),
        }
    }

    /// Run one analysis job for an uploaded payload.
    ///
    /// Unsupported media are rejected before anything is created. Every
    /// accepted submission yields a [`JobOutcome`] and leaves no upload,
    /// scope directory or result artifact behind.
    pub async fn submit(&self, media_type: &str, payload: &[u8]) -> Result<JobOutcome, SubmitError> {
        enter(JobState::Received);
        if !self.config.media_policy.accepts(media_type) {
            tracing::info!(media_type, "Rejected upload with unsupported media type");
            return Err(SubmitError::UnsupportedMedia {
                media_type: media_type.to_string(),
            });
        }

        let scope = JobScope::allocate();
        let span = tracing::info_span!("job", scope = %scope);
        self.run_in_scope(scope, media_type, payload)
            .instrument(span)
            .await
    }

    async fn run_in_scope(
        &self,
        scope: JobScope,
        media_type: &str,
        payload: &[u8],
    ) -> Result<JobOutcome, SubmitError> {
        let mut guard = ScopeGuard::new(self.store.clone(), scope, Arc::clone(&self.counters));
        enter(JobState::ScopeAllocated);

        let medium = UploadedMedium::allocate(&self.config.upload_dir, media_type);
        guard.track_input(medium.path().to_path_buf());

        let output_dir = scope.output_dir(self.store.root());
        let staged = async {
            medium.write(payload).await?;
            tokio::fs::create_dir_all(&output_dir).await
        }
        .await;
        if let Err(e) = staged {
            tracing::error!(error = %e, "Failed to stage upload");
            guard.release().await;
            enter(JobState::Done);
            return Err(SubmitError::Staging(e));
        }
        tracing::debug!(
            medium = %medium.id(),
            bytes = payload.len(),
            media_type = medium.media_type(),
            "Upload staged"
        );

        let outcome = self.execute(&scope, &medium, output_dir, &mut guard).await;
        guard.release().await;
        enter(JobState::Done);

        if outcome.is_success() {
            tracing::info!(outcome = outcome.label(), "Analysis job finished");
        } else {
            tracing::warn!(outcome = outcome.label(), "Analysis job finished without a result");
        }
        Ok(outcome)
    }

    async fn execute(
        &self,
        scope: &JobScope,
        medium: &UploadedMedium,
        output_dir: PathBuf,
        guard: &mut ScopeGuard,
    ) -> JobOutcome {
        enter(JobState::Running);
        let request = RunRequest {
            input_path: medium.path().to_path_buf(),
            output_dir,
            scope: *scope,
            timeout: self.config.job_timeout,
        };

        match self.runner.run(request).await {
            Ok(process) => {
                tracing::info!(
                    duration_ms = process.duration_ms,
                    exit_code = process.exit_code,
                    "Analysis worker completed"
                );
            }
            Err(RunnerError::Timeout { elapsed_ms }) => {
                enter(JobState::TimedOut);
                tracing::warn!(elapsed_ms, "Analysis worker timed out and was killed");
                return JobOutcome::Timeout;
            }
            Err(RunnerError::ExecutionFailed { exit_code, stderr }) => {
                enter(JobState::Failed);
                tracing::warn!(exit_code, stderr = %stderr, "Analysis worker failed");
                let diagnostic = if stderr.is_empty() {
                    format!("worker exited with code {exit_code}")
                } else {
                    stderr
                };
                return JobOutcome::AnalysisFailed(diagnostic);
            }
            Err(e) => {
                enter(JobState::Failed);
                tracing::error!(error = %e, "Analysis worker could not run");
                return JobOutcome::AnalysisFailed(e.to_string());
            }
        }

        enter(JobState::Resolving);
        let artifact = match self
            .store
            .resolve_latest(ArtifactCategory::Result, &self.config.result_pattern, Some(scope))
            .await
        {
            Ok(Some(artifact)) => artifact,
            Ok(None) => {
                tracing::warn!(
                    pattern = self.config.result_pattern.as_str(),
                    "Worker produced no matching result artifact"
                );
                return JobOutcome::ArtifactMissing;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to list scope output");
                return JobOutcome::ArtifactMissing;
            }
        };
        guard.track_artifact(artifact.clone());

        let bytes = match self.store.read(&artifact).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "Result artifact could not be read");
                return JobOutcome::ArtifactUnreadable(e.to_string());
            }
        };
        let result: JobResult = match serde_json::from_slice(&bytes) {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(file = %artifact.file_name, error = %e, "Result artifact is not a JSON object");
                return JobOutcome::ArtifactUnreadable(e.to_string());
            }
        };
        enter(JobState::Parsed);

        if self.config.publish_derived {
            match derived::publish(&self.store, &result).await {
                Ok(Some(published)) => tracing::info!(
                    summary = %published.summary.display(),
                    dataset = %published.dataset.display(),
                    "Published derived artifacts"
                ),
                Ok(None) => tracing::debug!("Result is not a per-second analysis; nothing derived"),
                Err(e) => tracing::warn!(error = %e, "Failed to publish derived artifacts"),
            }
        }

        JobOutcome::Success(result)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
