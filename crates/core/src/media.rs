//! Uploaded media: the declared-type allow-list and temporary staging.
//!
//! The accepted media types belong to the external worker's contract, so the
//! allow-list is always built from configuration. [`DEFAULT_ACCEPTED_MEDIA_TYPE`]
//! is only the fallback used when nothing is configured.

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Media type accepted when no allow-list is configured.
pub const DEFAULT_ACCEPTED_MEDIA_TYPE: &str = "video/mp4";

/// Known video media types and the file extension used when staging them.
const KNOWN_EXTENSIONS: &[(&str, &str)] = &[
    ("video/mp4", "mp4"),
    ("video/webm", "webm"),
    ("video/quicktime", "mov"),
    ("video/x-matroska", "mkv"),
    ("video/x-msvideo", "avi"),
    ("video/mpeg", "mpeg"),
];

// ---------------------------------------------------------------------------
// Media policy
// ---------------------------------------------------------------------------

/// Allow-list of declared media types the worker can analyse.
#[derive(Debug, Clone)]
pub struct MediaPolicy {
    accepted: Vec<String>,
}

impl MediaPolicy {
    /// Build a policy from configured media types.
    ///
    /// Entries are normalised with [`essence`]; an empty list is rejected
    /// because it would refuse every upload.
    pub fn new<I, S>(accepted: I) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let accepted: Vec<String> = accepted
            .into_iter()
            .map(|m| essence(m.as_ref()))
            .filter(|m| !m.is_empty())
            .collect();

        if accepted.is_empty() {
            return Err(CoreError::Validation(
                "At least one accepted media type must be configured".to_string(),
            ));
        }
        Ok(Self { accepted })
    }

    /// Whether a declared media type is on the allow-list.
    ///
    /// Parameters (`; codecs=...`) and letter case are ignored.
    pub fn accepts(&self, media_type: &str) -> bool {
        let declared = essence(media_type);
        self.accepted.iter().any(|m| *m == declared)
    }

    /// The normalised allow-list.
    pub fn accepted(&self) -> &[String] {
        &self.accepted
    }
}

impl Default for MediaPolicy {
    fn default() -> Self {
        Self {
            accepted: vec![DEFAULT_ACCEPTED_MEDIA_TYPE.to_string()],
        }
    }
}

/// Strip parameters and lowercase a media type: `Video/MP4; codecs=avc1` -> `video/mp4`.
pub fn essence(media_type: &str) -> String {
    media_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// File extension used when staging a medium of the given type.
pub fn extension_for(media_type: &str) -> &'static str {
    let declared = essence(media_type);
    KNOWN_EXTENSIONS
        .iter()
        .find(|(m, _)| *m == declared)
        .map(|(_, ext)| *ext)
        .unwrap_or("bin")
}

// ---------------------------------------------------------------------------
// Uploaded medium
// ---------------------------------------------------------------------------

/// A request's uploaded payload, staged as a temporary file.
///
/// Owned exclusively by the orchestrator, which deletes it when the
/// request's scope ends.
#[derive(Debug, Clone)]
pub struct UploadedMedium {
    id: Uuid,
    media_type: String,
    path: PathBuf,
}

impl UploadedMedium {
    /// Pick a fresh path under `upload_dir` for a medium of `media_type`.
    ///
    /// Nothing touches the filesystem until [`UploadedMedium::write`], so the
    /// path can be registered for cleanup before any byte is written.
    pub fn allocate(upload_dir: &Path, media_type: &str) -> Self {
        let id = Uuid::new_v4();
        let path = upload_dir.join(format!("{}.{}", id.simple(), extension_for(media_type)));
        Self {
            id,
            media_type: essence(media_type),
            path,
        }
    }

    /// Write the payload, creating the upload directory if needed.
    pub async fn write(&self, bytes: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, bytes).await
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
