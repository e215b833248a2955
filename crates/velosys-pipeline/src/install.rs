//! Classification and dependency installation.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{DeployError, Result};
use crate::events::ProgressSink;
use crate::project::{InstallPlan, ProjectClassification};
use crate::runner::CommandRunner;
use crate::workspace::Workspace;

/// Classifies a fetched workspace and installs its dependencies.
#[async_trait]
pub trait ProjectInstaller: Send + Sync {
    async fn setup(
        &self,
        workspace: &Workspace,
        sink: &dyn ProgressSink,
    ) -> Result<ProjectClassification>;
}

/// Installer that runs the package manager matching the project.
pub struct DependencyInstaller {
    runner: Arc<dyn CommandRunner>,
}

impl DependencyInstaller {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl ProjectInstaller for DependencyInstaller {
    async fn setup(
        &self,
        workspace: &Workspace,
        sink: &dyn ProgressSink,
    ) -> Result<ProjectClassification> {
        let plan = match InstallPlan::detect(workspace.path()).await {
            Ok(plan) => plan,
            Err(e) => {
                sink.log(&format!("Error setting up project: {e}"));
                return Err(e);
            }
        };
        let classification = plan.classification();
        sink.log(&format!("Project type detected: {classification}"));

        let Some(command) = plan.command(workspace.path()) else {
            return Ok(classification);
        };

        sink.log("Installing dependencies...");
        debug!(command = %command.display(), "running install");
        let output = self.runner.run(&command).await.map_err(|e| {
            sink.log(&format!("Error setting up project: {e}"));
            DeployError::setup(format!("failed to run {}: {e}", command.program))
        })?;

        if !output.passed() {
            let reason = format!(
                "{} exited with code {}: {}",
                command.display(),
                output.exit_code,
                output.diagnostic()
            );
            sink.log(&format!("Error setting up project: {reason}"));
            return Err(DeployError::setup(reason));
        }

        sink.log("Dependencies installed successfully");
        Ok(classification)
    }
}
