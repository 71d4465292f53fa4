//! Summary and dataset artifacts derived from a per-second analysis.
//!
//! The analysis worker reports one entry per analysed second:
//!
//! ```text
//! { "10": { "frames_analyzed": 10, "face_confidence": 0.93,
//!           "prevalent_emotion": "happy",
//!           "emotions": { "happy": 71.2, "sad": 3.1, ... } }, ... }
//! ```
//!
//! From that, a summary document and a tabular dataset are published into
//! the shared results directory, where the query endpoints find them.
//! Results of any other shape publish nothing.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::artifacts::{ArtifactError, ArtifactStore};
use crate::outcome::JobResult;

/// File name prefix of published summary documents.
pub const SUMMARY_PREFIX: &str = "emotion_summary_";

/// File name prefix of published dataset snapshots.
pub const DATASET_PREFIX: &str = "emotion_dataset_";

/// Errors raised while deriving or publishing artifacts.
#[derive(Debug, thiserror::Error)]
pub enum DeriveError {
    #[error("failed to encode dataset: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to encode summary: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to flush dataset: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

// ---------------------------------------------------------------------------
// Per-second analysis
// ---------------------------------------------------------------------------

/// Aggregated analysis of one second of video.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SecondAnalysis {
    pub frames_analyzed: u64,
    pub face_confidence: f64,
    pub prevalent_emotion: Option<String>,
    #[serde(default)]
    pub emotions: BTreeMap<String, f64>,
}

/// A worker result interpreted as per-second analysis, ordered by second.
#[derive(Debug, Clone, PartialEq)]
pub struct PerSecondAnalysis {
    seconds: BTreeMap<u64, SecondAnalysis>,
}

impl PerSecondAnalysis {
    /// Interpret a result document, or `None` if it is empty or any entry
    /// does not fit the per-second shape.
    pub fn from_result(result: &JobResult) -> Option<Self> {
        if result.is_empty() {
            return None;
        }
        let mut seconds = BTreeMap::new();
        for (key, value) in result {
            let second = key.parse::<u64>().ok()?;
            let analysis = SecondAnalysis::deserialize(value).ok()?;
            seconds.insert(second, analysis);
        }
        Some(Self { seconds })
    }

    pub fn len(&self) -> usize {
        self.seconds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seconds.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

/// Whole-video summary of a per-second analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionSummary {
    pub total_seconds_analyzed: usize,
    pub total_frames_analyzed: u64,
    pub average_face_confidence: f64,
    pub most_common_emotion: Option<String>,
    /// Emotion name to the number of seconds it prevailed.
    pub emotion_distribution: BTreeMap<String, u64>,
}

/// Summarise an analysis.
///
/// The most common emotion is the one that prevailed in the most seconds;
/// ties go to the alphabetically first name.
pub fn summarize(analysis: &PerSecondAnalysis) -> EmotionSummary {
    let total_seconds = analysis.seconds.len();
    let total_frames = analysis.seconds.values().map(|s| s.frames_analyzed).sum();
    let confidence_sum: f64 = analysis.seconds.values().map(|s| s.face_confidence).sum();
    let average = if total_seconds == 0 {
        0.0
    } else {
        confidence_sum / total_seconds as f64
    };

    let mut distribution: BTreeMap<String, u64> = BTreeMap::new();
    for emotion in analysis
        .seconds
        .values()
        .filter_map(|s| s.prevalent_emotion.as_ref())
    {
        *distribution.entry(emotion.clone()).or_default() += 1;
    }

    // BTreeMap iterates names ascending, so keeping only strictly greater
    // counts leaves the alphabetically first name on ties.
    let mut most_common: Option<(&String, u64)> = None;
    for (emotion, &count) in &distribution {
        let better = match most_common {
            None => true,
            Some((_, best)) => count > best,
        };
        if better {
            most_common = Some((emotion, count));
        }
    }

    EmotionSummary {
        total_seconds_analyzed: total_seconds,
        total_frames_analyzed: total_frames,
        average_face_confidence: round3(average),
        most_common_emotion: most_common.map(|(emotion, _)| emotion.clone()),
        emotion_distribution: distribution,
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

// ---------------------------------------------------------------------------
// Dataset
// ---------------------------------------------------------------------------

/// Encode an analysis as CSV, one row per second in ascending order.
///
/// Columns: `second, frames_analyzed, face_confidence, prevalent_emotion`,
/// then `emotion_<name>` for every emotion seen, sorted by name. Missing
/// values are left empty.
pub fn dataset_csv(analysis: &PerSecondAnalysis) -> Result<Vec<u8>, DeriveError> {
    let emotions: BTreeSet<&String> = analysis
        .seconds
        .values()
        .flat_map(|s| s.emotions.keys())
        .collect();

    let mut writer = csv::Writer::from_writer(Vec::new());

    let mut header = vec![
        "second".to_string(),
        "frames_analyzed".to_string(),
        "face_confidence".to_string(),
        "prevalent_emotion".to_string(),
    ];
    header.extend(emotions.iter().map(|e| format!("emotion_{e}")));
    writer.write_record(&header)?;

    for (second, entry) in &analysis.seconds {
        let mut row = vec![
            second.to_string(),
            entry.frames_analyzed.to_string(),
            entry.face_confidence.to_string(),
            entry.prevalent_emotion.clone().unwrap_or_default(),
        ];
        row.extend(
            emotions
                .iter()
                .map(|e| entry.emotions.get(*e).map(f64::to_string).unwrap_or_default()),
        );
        writer.write_record(&row)?;
    }

    writer.into_inner().map_err(|e| DeriveError::Io(e.into_error()))
}

// ---------------------------------------------------------------------------
// Publishing
// ---------------------------------------------------------------------------

/// Paths of one published summary/dataset pair.
#[derive(Debug, Clone)]
pub struct PublishedArtifacts {
    pub summary: PathBuf,
    pub dataset: PathBuf,
}

/// Derive and publish the summary and dataset for a successful result.
///
/// Returns `Ok(None)` when the result is not a per-second analysis.
pub async fn publish(
    store: &ArtifactStore,
    result: &JobResult,
) -> Result<Option<PublishedArtifacts>, DeriveError> {
    let Some(analysis) = PerSecondAnalysis::from_result(result) else {
        return Ok(None);
    };

    let run_id = Uuid::new_v4().simple().to_string();
    let summary_bytes = serde_json::to_vec_pretty(&summarize(&analysis))?;
    let dataset_bytes = dataset_csv(&analysis)?;

    let summary = store
        .publish(&format!("{SUMMARY_PREFIX}{run_id}.json"), &summary_bytes)
        .await?;
    let dataset = store
        .publish(&format!("{DATASET_PREFIX}{run_id}.csv"), &dataset_bytes)
        .await?;

    Ok(Some(PublishedArtifacts { summary, dataset }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
