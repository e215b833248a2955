//! Per-run working directories.

use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use crate::config::DeployConfig;
use crate::error::Result;

/// Attempts at finding a free directory name before giving up.
const MAX_NAME_ATTEMPTS: u32 = 64;

/// An isolated directory owned by one deployment run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    path: PathBuf,
}

impl Workspace {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Final path component, used to name the deployment.
    pub fn dir_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    pub fn join(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }
}

/// Allocates and reclaims workspaces.
#[async_trait]
pub trait WorkspaceProvider: Send + Sync {
    /// Create a fresh, empty workspace named after `seed`.
    async fn create(&self, seed: &str) -> Result<Workspace>;

    /// Remove the workspace and everything in it. A workspace that is
    /// already gone is not an error.
    async fn destroy(&self, workspace: &Workspace) -> Result<()>;
}

/// Workspaces under a temporary-files root.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
    prefix: String,
}

impl WorkspaceManager {
    pub fn new(root: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            prefix: prefix.into(),
        }
    }

    pub fn from_config(config: &DeployConfig) -> Self {
        Self::new(&config.temp_root, &config.workspace_prefix)
    }
}

#[async_trait]
impl WorkspaceProvider for WorkspaceManager {
    async fn create(&self, seed: &str) -> Result<Workspace> {
        tokio::fs::create_dir_all(&self.root).await?;

        let base = format!("{}-{}-{}", self.prefix, seed, Utc::now().timestamp_millis());
        let mut attempt = 0;
        loop {
            let name = if attempt == 0 {
                base.clone()
            } else {
                format!("{base}-{attempt}")
            };
            let path = self.root.join(name);
            match tokio::fs::create_dir(&path).await {
                Ok(()) => {
                    debug!(path = %path.display(), "workspace created");
                    return Ok(Workspace::new(path));
                }
                Err(e) if e.kind() == IoErrorKind::AlreadyExists && attempt < MAX_NAME_ATTEMPTS => {
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn destroy(&self, workspace: &Workspace) -> Result<()> {
        match tokio::fs::remove_dir_all(workspace.path()).await {
            Ok(()) => {
                debug!(path = %workspace.path().display(), "workspace removed");
                Ok(())
            }
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Derive the workspace seed from a repository URL: the last path segment
/// without a trailing `.git`, or `repo` when that is empty.
pub fn repo_slug(repository_url: &str) -> String {
    let last = repository_url.rsplit('/').next().unwrap_or_default();
    let slug = last.strip_suffix(".git").unwrap_or(last);
    if slug.is_empty() {
        "repo".to_string()
    } else {
        slug.to_string()
    }
}
