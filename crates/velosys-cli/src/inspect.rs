//! Local, read-only preview of what a deployment of a directory would do.

use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use velosys_pipeline::manifest::MANIFEST_FILE;
use velosys_pipeline::{
    ArtifactPackager, DeploymentManifest, InstallPlan, PackageManager, ProjectClassification,
};

#[derive(Debug, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ManifestPreview {
    /// A manifest exists and would be kept as-is.
    Keep,
    /// This manifest would be written.
    Create { manifest: DeploymentManifest },
}

#[derive(Debug, Serialize)]
pub struct InspectReport {
    pub classification: ProjectClassification,
    pub package_manager: Option<PackageManager>,
    pub install_command: Option<String>,
    pub manifest: ManifestPreview,
    pub files: usize,
    pub total_bytes: u64,
    pub skipped: usize,
    pub digest: String,
}

pub async fn inspect(path: &Path) -> Result<InspectReport> {
    if !path.is_dir() {
        anyhow::bail!("{} is not a directory", path.display());
    }

    let plan = InstallPlan::detect(path)
        .await
        .with_context(|| format!("failed to classify {}", path.display()))?;
    let classification = plan.classification();
    let package_manager = match &plan {
        InstallPlan::Node {
            package_manager, ..
        } => Some(*package_manager),
        _ => None,
    };

    let manifest = if path.join(MANIFEST_FILE).exists() {
        ManifestPreview::Keep
    } else {
        ManifestPreview::Create {
            manifest: DeploymentManifest::for_classification(classification),
        }
    };

    let artifact = ArtifactPackager
        .collect(path)
        .await
        .with_context(|| format!("failed to package {}", path.display()))?;

    Ok(InspectReport {
        classification,
        package_manager,
        install_command: plan.command(path).map(|c| c.display()),
        manifest,
        files: artifact.files.len(),
        total_bytes: artifact.total_bytes,
        skipped: artifact.skipped,
        digest: artifact.digest(),
    })
}

impl InspectReport {
    pub fn render(&self) -> Result<String> {
        let mut out = String::new();
        writeln!(out, "Project type:    {}", self.classification)?;
        if let Some(pm) = self.package_manager {
            writeln!(out, "Package manager: {}", pm.binary_name())?;
        }
        writeln!(
            out,
            "Install:         {}",
            self.install_command.as_deref().unwrap_or("(none)")
        )?;
        match &self.manifest {
            ManifestPreview::Keep => {
                writeln!(out, "Manifest:        existing {MANIFEST_FILE} kept")?
            }
            ManifestPreview::Create { manifest } => {
                writeln!(out, "Manifest:        {MANIFEST_FILE} would be created")?;
                for line in manifest.to_json_pretty()?.lines() {
                    writeln!(out, "    {line}")?;
                }
            }
        }
        writeln!(
            out,
            "Files:           {} ({} bytes, {} skipped)",
            self.files, self.total_bytes, self.skipped
        )?;
        write!(out, "Digest:          {}", self.digest)?;
        Ok(out)
    }
}
