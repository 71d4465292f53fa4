//! Terminal classification of one orchestrated request.

use serde_json::{Map, Value};

/// Parsed result document: field names to analysis values.
///
/// The shape is defined by the worker's output contract; the orchestrator
/// only requires a JSON object.
pub type JobResult = Map<String, Value>;

/// How an accepted request ended. Never retried automatically.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Success(JobResult),
    /// Worker exited non-zero or could not be started; carries diagnostics.
    AnalysisFailed(String),
    /// Worker succeeded but left nothing matching the result pattern.
    ArtifactMissing,
    /// The resolved result artifact failed to decode; carries the parse error.
    ArtifactUnreadable(String),
    /// Worker exceeded its allowed duration and was killed.
    Timeout,
}

/// Every non-success [`JobOutcome`], as an error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum JobFailure {
    #[error("Analysis failed: {0}")]
    AnalysisFailed(String),

    #[error("Analysis finished without producing a result")]
    ArtifactMissing,

    #[error("Analysis result could not be decoded: {0}")]
    ArtifactUnreadable(String),

    #[error("Analysis timed out")]
    Timeout,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Short reason used in logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::AnalysisFailed(_) => "analysis_failed",
            Self::ArtifactMissing => "artifact_missing",
            Self::ArtifactUnreadable(_) => "artifact_unreadable",
            Self::Timeout => "timeout",
        }
    }

    pub fn into_result(self) -> Result<JobResult, JobFailure> {
        match self {
            Self::Success(result) => Ok(result),
            Self::AnalysisFailed(diagnostic) => Err(JobFailure::AnalysisFailed(diagnostic)),
            Self::ArtifactMissing => Err(JobFailure::ArtifactMissing),
            Self::ArtifactUnreadable(error) => Err(JobFailure::ArtifactUnreadable(error)),
            Self::Timeout => Err(JobFailure::Timeout),
        }
    }
}

impl JobFailure {
    /// Machine-readable reason string surfaced to clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AnalysisFailed(_) => "ANALYSIS_FAILED",
            Self::ArtifactMissing => "ARTIFACT_MISSING",
            Self::ArtifactUnreadable(_) => "ARTIFACT_UNREADABLE",
            Self::Timeout => "TIMEOUT",
        }
    }
}
