//! Deployment manifest synthesis.
//!
//! A manifest already present in the repository is user configuration and is
//! never touched. Otherwise one is derived from the classification and
//! written atomically: the JSON goes to a temporary file in the workspace,
//! which is then linked into place without clobbering.

use std::io::Write;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{DeployError, Result};
use crate::events::ProgressSink;
use crate::project::ProjectClassification;
use crate::workspace::Workspace;

pub const MANIFEST_FILE: &str = "vercel.json";
pub const MANIFEST_VERSION: u8 = 2;

pub const STATIC_BUILDER: &str = "@vercel/static";
pub const PYTHON_BUILDER: &str = "@vercel/python";
pub const STATIC_SITE_BUILDER: &str = "@vercel/static-build";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildConfig {
    #[serde(rename = "distDir")]
    pub dist_dir: String,
}

/// One `builds` entry: which files, which builder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildRule {
    pub src: String,
    #[serde(rename = "use")]
    pub builder: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<BuildConfig>,
}

impl BuildRule {
    fn new(src: &str, builder: &str) -> Self {
        Self {
            src: src.to_string(),
            builder: builder.to_string(),
            config: None,
        }
    }

    fn static_build(dist_dir: &str) -> Self {
        Self {
            config: Some(BuildConfig {
                dist_dir: dist_dir.to_string(),
            }),
            ..Self::new("package.json", STATIC_SITE_BUILDER)
        }
    }
}

/// Contents of `vercel.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeploymentManifest {
    pub version: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub builds: Option<Vec<BuildRule>>,
}

impl DeploymentManifest {
    /// A bare manifest: version marker only, platform detection applies.
    pub fn bare() -> Self {
        Self {
            version: MANIFEST_VERSION,
            framework: None,
            builds: None,
        }
    }

    /// Manifest synthesized for a classification.
    ///
    /// Svelte, Angular and generic Node projects get the bare manifest.
    pub fn for_classification(classification: ProjectClassification) -> Self {
        let builds = |rule: BuildRule| Self {
            builds: Some(vec![rule]),
            ..Self::bare()
        };
        match classification {
            ProjectClassification::Static => builds(BuildRule::new("*.html", STATIC_BUILDER)),
            ProjectClassification::Python => builds(BuildRule::new("*.py", PYTHON_BUILDER)),
            ProjectClassification::NextJs => Self {
                framework: Some("nextjs".to_string()),
                ..Self::bare()
            },
            ProjectClassification::React => builds(BuildRule::static_build("build")),
            ProjectClassification::Vue => builds(BuildRule::static_build("dist")),
            ProjectClassification::Svelte
            | ProjectClassification::Angular
            | ProjectClassification::NodeGeneric => Self::bare(),
        }
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| DeployError::config(format!("could not serialize manifest: {e}")))
    }
}

/// Outcome of [`ManifestWriter::configure`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestOutcome {
    /// A manifest was already present and was left untouched.
    Existing,
    /// A manifest was synthesized and written.
    Created(DeploymentManifest),
}

/// Ensures a deployment manifest exists in the workspace.
#[async_trait]
pub trait ManifestWriter: Send + Sync {
    async fn configure(
        &self,
        workspace: &Workspace,
        classification: ProjectClassification,
        sink: &dyn ProgressSink,
    ) -> Result<ManifestOutcome>;
}

/// Writes `vercel.json` into the workspace root when it is missing.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManifestConfigurator;

#[async_trait]
impl ManifestWriter for ManifestConfigurator {
    async fn configure(
        &self,
        workspace: &Workspace,
        classification: ProjectClassification,
        sink: &dyn ProgressSink,
    ) -> Result<ManifestOutcome> {
        sink.log(&format!("Configuring project for {classification}..."));

        let path = workspace.join(MANIFEST_FILE);
        let exists = tokio::fs::try_exists(&path).await.map_err(|e| {
            sink.log(&format!("Error configuring project: {e}"));
            DeployError::config(format!("could not inspect {MANIFEST_FILE}: {e}"))
        })?;
        let outcome = if exists {
            sink.log(&format!("Using existing {MANIFEST_FILE} configuration"));
            ManifestOutcome::Existing
        } else {
            let manifest = DeploymentManifest::for_classification(classification);
            let body = manifest.to_json_pretty()?;
            let dir = workspace.path().to_path_buf();
            let result = tokio::task::spawn_blocking(move || write_new(&dir, body.as_bytes()))
                .await
                .map_err(|e| DeployError::Unexpected(format!("manifest writer panicked: {e}")))?;
            match result {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    sink.log(&format!("Using existing {MANIFEST_FILE} configuration"));
                    sink.log("Project configured successfully");
                    return Ok(ManifestOutcome::Existing);
                }
                Err(e) => {
                    sink.log(&format!("Error configuring project: {e}"));
                    return Err(DeployError::config(format!(
                        "could not write {MANIFEST_FILE}: {e}"
                    )));
                }
            }
            sink.log(&format!("Created {MANIFEST_FILE} configuration file"));
            ManifestOutcome::Created(manifest)
        };

        sink.log("Project configured successfully");
        Ok(outcome)
    }
}

/// Write `contents` to `<dir>/vercel.json`, failing with `AlreadyExists`
/// rather than replacing a file that appeared in the meantime.
fn write_new(dir: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist_noclobber(dir.join(MANIFEST_FILE))
        .map_err(|e| e.error)?;
    Ok(())
}
