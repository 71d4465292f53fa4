//! Directory-backed artifact registry.
//!
//! Workers name their output files themselves (embedded timestamps, run
//! ids), so artifacts are located by category pattern and recency rather
//! than by a fixed name. See [`store::ArtifactStore`].

pub mod pattern;
pub mod store;

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::scope::JobScope;
use crate::types::Timestamp;

pub use pattern::ArtifactPattern;
pub use store::{ArtifactError, ArtifactStore};

/// What kind of document an artifact holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactCategory {
    /// Per-job structured result written by the worker.
    Result,
    /// Tabular snapshot derived from a result.
    Dataset,
    /// Summary document derived from a result.
    Summary,
}

impl ArtifactCategory {
    pub fn label(self) -> &'static str {
        match self {
            Self::Result => "result",
            Self::Dataset => "dataset",
            Self::Summary => "summary",
        }
    }
}

impl fmt::Display for ArtifactCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Where an artifact was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactScope {
    /// Produced by an isolated job under this scope.
    Scoped(JobScope),
    /// Lives in the common results directory.
    Shared,
}

/// A resolved file in the results directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub file_name: String,
    pub category: ArtifactCategory,
    pub scope: ArtifactScope,
    pub modified: Timestamp,
}
