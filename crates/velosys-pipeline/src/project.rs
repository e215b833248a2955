//! Project classification from workspace contents.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{DeployError, Result};
use crate::runner::CommandSpec;

pub const PACKAGE_DESCRIPTOR: &str = "package.json";
pub const PYTHON_REQUIREMENTS: &str = "requirements.txt";
pub const YARN_LOCKFILE: &str = "yarn.lock";
pub const PNPM_LOCKFILE: &str = "pnpm-lock.yaml";

/// Runtime/framework of a project.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ProjectClassification {
    NodeGeneric,
    NextJs,
    React,
    Vue,
    Svelte,
    Angular,
    Python,
    Static,
}

impl ProjectClassification {
    /// Classify a Node project by its direct dependency names.
    ///
    /// Priority: next, react, vue, svelte, angular / @angular/core.
    pub fn from_dependencies<'a, I>(names: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let names: Vec<&str> = names.into_iter().collect();
        let has = |dep: &str| names.iter().any(|n| *n == dep);

        if has("next") {
            ProjectClassification::NextJs
        } else if has("react") {
            ProjectClassification::React
        } else if has("vue") {
            ProjectClassification::Vue
        } else if has("svelte") {
            ProjectClassification::Svelte
        } else if has("angular") || has("@angular/core") {
            ProjectClassification::Angular
        } else {
            ProjectClassification::NodeGeneric
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProjectClassification::NodeGeneric => "Node.js",
            ProjectClassification::NextJs => "Next.js",
            ProjectClassification::React => "React",
            ProjectClassification::Vue => "Vue.js",
            ProjectClassification::Svelte => "Svelte",
            ProjectClassification::Angular => "Angular",
            ProjectClassification::Python => "Python",
            ProjectClassification::Static => "Static HTML",
        }
    }
}

impl fmt::Display for ProjectClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Node package manager, chosen by lockfile.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
    Npm,
    Yarn,
    Pnpm,
}

impl PackageManager {
    /// `yarn.lock` wins over `pnpm-lock.yaml`; neither means npm.
    pub fn detect(dir: &Path) -> Self {
        if dir.join(YARN_LOCKFILE).exists() {
            PackageManager::Yarn
        } else if dir.join(PNPM_LOCKFILE).exists() {
            PackageManager::Pnpm
        } else {
            PackageManager::Npm
        }
    }

    pub fn binary_name(&self) -> &'static str {
        match self {
            PackageManager::Npm => "npm",
            PackageManager::Yarn => "yarn",
            PackageManager::Pnpm => "pnpm",
        }
    }

    pub fn install_command(&self, dir: &Path) -> CommandSpec {
        CommandSpec::new(self.binary_name())
            .arg("install")
            .current_dir(dir)
    }
}

/// The parts of `package.json` used for classification.
///
/// `dependencies` is kept as raw JSON: only an object contributes names, any
/// other shape counts as no dependencies.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageDescriptor {
    #[serde(default)]
    pub dependencies: Option<serde_json::Value>,
}

impl PackageDescriptor {
    pub fn parse(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| DeployError::setup(format!("invalid {PACKAGE_DESCRIPTOR}: {e}")))
    }

    pub fn classify(&self) -> ProjectClassification {
        match &self.dependencies {
            Some(serde_json::Value::Object(deps)) => {
                ProjectClassification::from_dependencies(deps.keys().map(String::as_str))
            }
            _ => ProjectClassification::NodeGeneric,
        }
    }
}

/// What the installer will do for a workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallPlan {
    Node {
        classification: ProjectClassification,
        package_manager: PackageManager,
    },
    Python,
    Static,
}

impl InstallPlan {
    /// Inspect `dir` and decide classification and install step. First match
    /// wins: package descriptor, then requirements file, then static.
    pub async fn detect(dir: &Path) -> Result<Self> {
        let descriptor = dir.join(PACKAGE_DESCRIPTOR);
        if descriptor.exists() {
            let content = tokio::fs::read_to_string(&descriptor).await.map_err(|e| {
                DeployError::setup(format!("could not read {PACKAGE_DESCRIPTOR}: {e}"))
            })?;
            let classification = PackageDescriptor::parse(&content)?.classify();
            return Ok(InstallPlan::Node {
                classification,
                package_manager: PackageManager::detect(dir),
            });
        }
        if dir.join(PYTHON_REQUIREMENTS).exists() {
            return Ok(InstallPlan::Python);
        }
        Ok(InstallPlan::Static)
    }

    pub fn classification(&self) -> ProjectClassification {
        match self {
            InstallPlan::Node { classification, .. } => *classification,
            InstallPlan::Python => ProjectClassification::Python,
            InstallPlan::Static => ProjectClassification::Static,
        }
    }

    /// The dependency-install command, if any.
    pub fn command(&self, dir: &Path) -> Option<CommandSpec> {
        match self {
            InstallPlan::Node {
                package_manager, ..
            } => Some(package_manager.install_command(dir)),
            InstallPlan::Python => Some(
                CommandSpec::new("pip")
                    .args(["install", "-r", PYTHON_REQUIREMENTS])
                    .current_dir(dir),
            ),
            InstallPlan::Static => None,
        }
    }
}
