//! Read-only lookups of the latest shared dataset and summary.
//!
//! These reads are deliberately unscoped: they return the newest artifact of
//! a category produced by any job. They never delete, so they are safe to
//! run alongside in-flight jobs.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Number, Value};

use crate::artifacts::{Artifact, ArtifactCategory, ArtifactError, ArtifactPattern, ArtifactStore};
use crate::types::Timestamp;

/// Default pattern for dataset snapshots.
pub const DEFAULT_DATASET_PATTERN: &str = "emotion_dataset_*.csv";

/// Default pattern for summary documents.
pub const DEFAULT_SUMMARY_PATTERN: &str = "emotion_summary_*.json";

/// Errors raised by the query service. "Nothing published yet" is not an
/// error; it is `Ok(None)`.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error("Failed to decode {file_name}: {message}")]
    Decode { file_name: String, message: String },
}

/// One row of a dataset: column name to decoded cell, in header order.
pub type DatasetRow = IndexMap<String, Value>;

/// Decoded dataset snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct DatasetSnapshot {
    pub file_name: String,
    pub modified_at: Timestamp,
    pub columns: Vec<String>,
    pub rows: Vec<DatasetRow>,
}

/// Decoded summary document.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryDocument {
    pub file_name: String,
    pub modified_at: Timestamp,
    pub summary: Map<String, Value>,
}

/// Resolves and decodes the latest shared artifacts.
#[derive(Debug, Clone)]
pub struct QueryService {
    store: ArtifactStore,
    dataset_pattern: ArtifactPattern,
    summary_pattern: ArtifactPattern,
}

impl QueryService {
    pub fn new(
        store: ArtifactStore,
        dataset_pattern: ArtifactPattern,
        summary_pattern: ArtifactPattern,
    ) -> Self {
        Self {
            store,
            dataset_pattern,
            summary_pattern,
        }
    }

    pub fn dataset_pattern(&self) -> &ArtifactPattern {
        &self.dataset_pattern
    }

    pub fn summary_pattern(&self) -> &ArtifactPattern {
        &self.summary_pattern
    }

    /// Latest dataset snapshot in the shared directory, if any.
    pub async fn latest_dataset(&self) -> Result<Option<DatasetSnapshot>, QueryError> {
        let Some((artifact, bytes)) = self
            .load_latest(ArtifactCategory::Dataset, &self.dataset_pattern)
            .await?
        else {
            return Ok(None);
        };

        let (columns, rows) = decode_dataset(&bytes).map_err(|e| QueryError::Decode {
            file_name: artifact.file_name.clone(),
            message: e.to_string(),
        })?;

        tracing::debug!(file = %artifact.file_name, rows = rows.len(), "Resolved latest dataset");

        Ok(Some(DatasetSnapshot {
            file_name: artifact.file_name,
            modified_at: artifact.modified,
            columns,
            rows,
        }))
    }

    /// Latest summary document in the shared directory, if any.
    pub async fn latest_summary(&self) -> Result<Option<SummaryDocument>, QueryError> {
        let Some((artifact, bytes)) = self
            .load_latest(ArtifactCategory::Summary, &self.summary_pattern)
            .await?
        else {
            return Ok(None);
        };

        let summary: Map<String, Value> =
            serde_json::from_slice(&bytes).map_err(|e| QueryError::Decode {
                file_name: artifact.file_name.clone(),
                message: e.to_string(),
            })?;

        tracing::debug!(file = %artifact.file_name, "Resolved latest summary");

        Ok(Some(SummaryDocument {
            file_name: artifact.file_name,
            modified_at: artifact.modified,
            summary,
        }))
    }

    async fn load_latest(
        &self,
        category: ArtifactCategory,
        pattern: &ArtifactPattern,
    ) -> Result<Option<(Artifact, Vec<u8>)>, QueryError> {
        let Some(artifact) = self.store.resolve_latest(category, pattern, None).await? else {
            return Ok(None);
        };
        let bytes = self.store.read(&artifact).await?;
        Ok(Some((artifact, bytes)))
    }
}

// ---------------------------------------------------------------------------
// Dataset decoding
// ---------------------------------------------------------------------------

/// Decode CSV with a header row into column names and row mappings.
///
/// Every row must have as many cells as the header.
pub fn decode_dataset(bytes: &[u8]) -> Result<(Vec<String>, Vec<DatasetRow>), csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(bytes);

    let columns: Vec<String> = reader
        .headers()?
        .iter()
        .map(std::string::ToString::to_string)
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row: DatasetRow = columns
            .iter()
            .cloned()
            .zip(record.iter().map(decode_cell))
            .collect();
        rows.push(row);
    }

    Ok((columns, rows))
}

/// Integers, then floats, then strings; empty cells are `null`.
fn decode_cell(cell: &str) -> Value {
    if cell.is_empty() {
        return Value::Null;
    }
    if let Ok(int) = cell.parse::<i64>() {
        return Value::Number(int.into());
    }
    if let Some(float) = cell.parse::<f64>().ok().and_then(Number::from_f64) {
        return Value::Number(float);
    }
    Value::String(cell.to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
