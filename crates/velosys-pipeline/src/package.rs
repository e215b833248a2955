//! Serializing the workspace tree into an upload-ready file list.

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::error::Result;

/// Version-control metadata directory.
pub const VCS_DIR: &str = ".git";
/// Dependency cache directory materialized by Node installs.
pub const DEPENDENCY_DIR: &str = "node_modules";

/// Content encoding of [`FileEntry::data`].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileEncoding {
    #[default]
    Base64,
}

/// One file of the deployment upload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileEntry {
    /// Path relative to the workspace root, `/`-separated.
    #[serde(rename = "file")]
    pub relative_path: String,
    /// File contents, base64-encoded.
    #[serde(rename = "data")]
    pub content_base64: String,
    pub encoding: FileEncoding,
}

impl FileEntry {
    pub fn new(relative_path: impl Into<String>, contents: &[u8]) -> Self {
        Self {
            relative_path: relative_path.into(),
            content_base64: STANDARD.encode(contents),
            encoding: FileEncoding::Base64,
        }
    }
}

/// The collected files plus summary figures for logging.
#[derive(Debug, Clone, Default)]
pub struct PackagedArtifact {
    pub files: Vec<FileEntry>,
    pub total_bytes: u64,
    pub skipped: usize,
}

impl PackagedArtifact {
    /// SHA-256 over every path and its encoded content, in upload order.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for entry in &self.files {
            hasher.update(entry.relative_path.as_bytes());
            hasher.update(b"\0");
            hasher.update(entry.content_base64.as_bytes());
            hasher.update(b"\0");
        }
        hex::encode(hasher.finalize())
    }
}

/// Whether an entry is pruned from the upload (and not descended into).
pub fn is_excluded(name: &str) -> bool {
    name == VCS_DIR || name == DEPENDENCY_DIR || name.starts_with('.')
}

/// Walks a workspace and base64-encodes every file that is not excluded.
#[derive(Debug, Default, Clone, Copy)]
pub struct ArtifactPackager;

impl ArtifactPackager {
    /// Depth-first walk with an explicit stack.
    ///
    /// Failing to list the root is an error; anything unreadable below it is
    /// skipped with a warning. Siblings are visited in name order.
    pub async fn collect(&self, root: &Path) -> Result<PackagedArtifact> {
        let mut artifact = PackagedArtifact::default();
        let mut stack: Vec<PathBuf> = Vec::new();

        let mut children = list_dir(root).await?;
        children.reverse();
        stack.extend(children);

        while let Some(path) = stack.pop() {
            let name = match path.file_name() {
                Some(n) => n.to_string_lossy().to_string(),
                None => continue,
            };
            if is_excluded(&name) {
                continue;
            }

            let file_type = match tokio::fs::symlink_metadata(&path).await {
                Ok(meta) => meta.file_type(),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable entry");
                    artifact.skipped += 1;
                    continue;
                }
            };

            if file_type.is_dir() {
                match list_dir(&path).await {
                    Ok(mut children) => {
                        children.reverse();
                        stack.extend(children);
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "skipping unreadable directory");
                        artifact.skipped += 1;
                    }
                }
                continue;
            }

            match tokio::fs::read(&path).await {
                Ok(contents) => {
                    artifact.total_bytes += contents.len() as u64;
                    artifact
                        .files
                        .push(FileEntry::new(relative_path(root, &path), &contents));
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable file");
                    artifact.skipped += 1;
                }
            }
        }

        Ok(artifact)
    }
}

async fn list_dir(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        paths.push(entry.path());
    }
    paths.sort();
    Ok(paths)
}

/// `/`-joined components of `path` below `root`.
fn relative_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
