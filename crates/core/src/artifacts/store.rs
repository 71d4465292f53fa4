//! Latest-artifact lookup and safe deletion over the results directory.
//!
//! The results directory is shared by every concurrent job. Reads take one
//! listing snapshot and never wait for files to appear: an artifact is only
//! looked up after the worker has reported completion. Scoped lookups see
//! only their own scope's files, so one request can never resolve (or
//! release) another request's output.

use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use super::{Artifact, ArtifactCategory, ArtifactPattern, ArtifactScope};
use crate::scope::JobScope;

/// Errors raised while listing, reading or publishing artifacts.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("failed to list artifact directory {}: {source}", .dir.display())]
    Listing {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read artifact {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to publish artifact {}: {source}", .path.display())]
    Publish {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Registry of artifact files rooted at the shared results directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

/// A listed file that matched the category pattern, with its mtime.
struct Candidate {
    path: PathBuf,
    file_name: String,
    modified: SystemTime,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the results directory if it does not exist yet.
    pub async fn ensure_root(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await
    }

    /// Resolve the newest artifact matching `pattern`.
    ///
    /// With a scope, only files inside the scope's output directory or
    /// directly in the root and carrying the scope token are considered.
    /// Without one, only regular files directly in the root are considered.
    ///
    /// The winner has the greatest modification time; equal times are
    /// broken by file name, greatest first. A missing directory resolves to
    /// `None`.
    pub async fn resolve_latest(
        &self,
        category: ArtifactCategory,
        pattern: &ArtifactPattern,
        scope: Option<&JobScope>,
    ) -> Result<Option<Artifact>, ArtifactError> {
        let listed = match scope {
            Some(scope) => {
                let mut listed = snapshot(&scope.output_dir(&self.root)).await?;
                listed.extend(
                    snapshot(&self.root)
                        .await?
                        .into_iter()
                        .filter(|(name, _)| scope.owns_file_name(name)),
                );
                listed
            }
            None => snapshot(&self.root).await?,
        };

        let mut best: Option<Candidate> = None;
        for (file_name, path) in listed {
            if !pattern.matches(&file_name) {
                continue;
            }
            let Some(modified) = stat_regular_file(&path).await else {
                continue;
            };

            let candidate = Candidate {
                path,
                file_name,
                modified,
            };
            let newer = match &best {
                None => true,
                Some(current) => {
                    (candidate.modified, &candidate.file_name)
                        > (current.modified, &current.file_name)
                }
            };
            if newer {
                best = Some(candidate);
            }
        }

        let artifact_scope = scope.map_or(ArtifactScope::Shared, |s| ArtifactScope::Scoped(*s));

        Ok(best.map(|c| Artifact {
            path: c.path,
            file_name: c.file_name,
            category,
            scope: artifact_scope,
            modified: c.modified.into(),
        }))
    }

    /// Read an artifact's bytes.
    pub async fn read(&self, artifact: &Artifact) -> Result<Vec<u8>, ArtifactError> {
        tokio::fs::read(&artifact.path)
            .await
            .map_err(|source| ArtifactError::Read {
                path: artifact.path.clone(),
                source,
            })
    }

    /// Delete an artifact. Already-gone files are not an error, and other
    /// failures are logged rather than returned.
    pub async fn release(&self, artifact: &Artifact) {
        remove_file_quietly(&artifact.path).await;
    }

    /// Delete everything a scope owns: its output directory, including any
    /// untrusted partial output, and root files carrying the scope token.
    /// Idempotent.
    pub async fn release_scope(&self, scope: &JobScope) {
        let dir = scope.output_dir(&self.root);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %dir.display(), error = %e, "Failed to release scope directory");
            }
        }

        match snapshot(&self.root).await {
            Ok(listed) => {
                for (name, path) in listed {
                    if scope.owns_file_name(&name) && path != dir {
                        remove_file_quietly(&path).await;
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "Failed to list root while releasing scope"),
        }
    }

    /// Blocking variant of [`ArtifactStore::release_scope`] for drop paths.
    pub fn release_scope_blocking(&self, scope: &JobScope) {
        let dir = scope.output_dir(&self.root);
        remove_dir_quietly_blocking(&dir);

        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to list root while releasing scope");
                return;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let owned = entry
                .file_name()
                .to_str()
                .is_some_and(|name| scope.owns_file_name(name));
            if owned && path != dir {
                remove_file_quietly_blocking(&path);
            }
        }
    }

    /// Atomically write a shared artifact into the root.
    ///
    /// The bytes go to a dot-prefixed temporary name first (never matched by
    /// any pattern) and are renamed into place, so readers see either
    /// nothing or the complete file.
    pub async fn publish(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf, ArtifactError> {
        let path = self.root.join(file_name);
        let staging = self.root.join(format!(".{file_name}.partial"));
        let publish_err = |source| ArtifactError::Publish {
            path: path.clone(),
            source,
        };

        self.ensure_root().await.map_err(publish_err)?;
        tokio::fs::write(&staging, bytes).await.map_err(publish_err)?;
        if let Err(e) = tokio::fs::rename(&staging, &path).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(publish_err(e));
        }
        Ok(path)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// List a directory once. A missing directory lists as empty; names that
/// are not valid UTF-8 are skipped.
async fn snapshot(dir: &Path) -> Result<Vec<(String, PathBuf)>, ArtifactError> {
    let listing_err = |source| ArtifactError::Listing {
        dir: dir.to_path_buf(),
        source,
    };

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(listing_err(e)),
    };

    let mut listed = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(listing_err)? {
        if let Some(name) = entry.file_name().to_str() {
            listed.push((name.to_string(), entry.path()));
        }
    }
    Ok(listed)
}

/// Modification time of a regular file, or `None` if it vanished, is not
/// a regular file, or cannot be inspected.
async fn stat_regular_file(path: &Path) -> Option<SystemTime> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => meta.modified().ok(),
        Ok(_) => None,
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable artifact");
            None
        }
    }
}

/// Delete a file, treating "already gone" as success and logging anything else.
pub async fn remove_file_quietly(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove file"),
    }
}

/// Blocking variant of [`remove_file_quietly`] for drop paths.
pub fn remove_file_quietly_blocking(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove file"),
    }
}

/// Blocking removal of a directory tree for drop paths. Idempotent.
fn remove_dir_quietly_blocking(path: &Path) {
    match std::fs::remove_dir_all(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove directory"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
