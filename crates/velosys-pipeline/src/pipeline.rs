//! Deployment orchestration.
//!
//! A run walks the five stages in order, reporting `pending` / `success` /
//! `error` per step. The first failing stage ends the run. On every exit path
//! after the workspace exists it is destroyed exactly once, and only then is
//! the terminal result emitted.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use tracing::{debug, Instrument};
use url::Url;
use uuid::Uuid;

use crate::config::DeployConfig;
use crate::error::{DeployError, ErrorKind, Result};
use crate::events::{ProgressEvent, ProgressSink, StepStatus};
use crate::fetch::{GitFetcher, SourceFetcher};
use crate::install::{DependencyInstaller, ProjectInstaller};
use crate::manifest::{ManifestConfigurator, ManifestWriter};
use crate::obs;
use crate::package::ArtifactPackager;
use crate::runner::{CommandRunner, SystemRunner};
use crate::stage::{PipelineState, Stage};
use crate::submit::{DeploymentApi, HttpSubmitter};
use crate::workspace::{repo_slug, Workspace, WorkspaceManager, WorkspaceProvider};

pub const SUCCESS_MESSAGE: &str = "Your website has been deployed successfully!";

/// A request to deploy one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentRequest {
    pub repository_url: String,
}

impl DeploymentRequest {
    pub fn new(repository_url: impl Into<String>) -> Self {
        Self {
            repository_url: repository_url.into(),
        }
    }

    /// Whether the URL's host is `host` or one of its subdomains.
    ///
    /// URLs that do not parse, or have no host, never match.
    pub fn is_hosted_on(&self, host: &str) -> bool {
        let Ok(url) = Url::parse(&self.repository_url) else {
            return false;
        };
        let Some(actual) = url.host_str() else {
            return false;
        };
        let actual = actual.to_ascii_lowercase();
        let host = host.to_ascii_lowercase();
        actual == host || actual.ends_with(&format!(".{host}"))
    }
}

/// Outcome of a run, mirroring the terminal result event.
#[derive(Debug)]
pub struct PipelineResult {
    pub deployment_id: String,
    pub success: bool,
    pub deployed_url: Option<String>,
    pub error: Option<DeployError>,
    pub duration_ms: u64,
}

impl PipelineResult {
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(DeployError::kind)
    }
}

/// Runs deployments with a fixed set of components.
///
/// Components are shared read-only between runs; one pipeline may drive many
/// concurrent runs.
#[derive(Clone)]
pub struct DeploymentPipeline {
    workspaces: Arc<dyn WorkspaceProvider>,
    fetcher: Arc<dyn SourceFetcher>,
    installer: Arc<dyn ProjectInstaller>,
    manifests: Arc<dyn ManifestWriter>,
    packager: ArtifactPackager,
    api: Arc<dyn DeploymentApi>,
}

impl DeploymentPipeline {
    /// Production components with subprocesses run by `tokio::process`.
    pub fn from_config(config: &DeployConfig) -> Result<Self> {
        Self::with_runner(config, Arc::new(SystemRunner))
    }

    /// Production components with a custom command runner.
    pub fn with_runner(config: &DeployConfig, runner: Arc<dyn CommandRunner>) -> Result<Self> {
        Ok(Self {
            workspaces: Arc::new(WorkspaceManager::from_config(config)),
            fetcher: Arc::new(GitFetcher::new(runner.clone(), config.source_token.clone())),
            installer: Arc::new(DependencyInstaller::new(runner)),
            manifests: Arc::new(ManifestConfigurator),
            packager: ArtifactPackager,
            api: Arc::new(HttpSubmitter::new(config)?),
        })
    }

    pub fn with_workspaces(mut self, workspaces: Arc<dyn WorkspaceProvider>) -> Self {
        self.workspaces = workspaces;
        self
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn SourceFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_installer(mut self, installer: Arc<dyn ProjectInstaller>) -> Self {
        self.installer = installer;
        self
    }

    pub fn with_manifest_writer(mut self, manifests: Arc<dyn ManifestWriter>) -> Self {
        self.manifests = manifests;
        self
    }

    pub fn with_api(mut self, api: Arc<dyn DeploymentApi>) -> Self {
        self.api = api;
        self
    }

    /// Run one deployment, reporting progress to `sink`.
    ///
    /// Never returns early without a terminal result event.
    pub async fn run(
        &self,
        request: &DeploymentRequest,
        sink: &dyn ProgressSink,
    ) -> PipelineResult {
        let deployment_id = Uuid::new_v4().to_string();
        let span = obs::deployment_span(&deployment_id);
        self.run_in_span(deployment_id, request, sink)
            .instrument(span)
            .await
    }

    async fn run_in_span(
        &self,
        deployment_id: String,
        request: &DeploymentRequest,
        sink: &dyn ProgressSink,
    ) -> PipelineResult {
        let start = Instant::now();
        obs::emit_deployment_started(&deployment_id, &request.repository_url);
        sink.log(&format!("Starting deployment for {}", request.repository_url));
        sink.step(Stage::Clone.index(), StepStatus::Pending);

        let mut state = PipelineState::Idle;
        let slug = repo_slug(&request.repository_url);
        let outcome = match self.workspaces.create(&slug).await {
            Ok(workspace) => {
                debug!(path = %workspace.path().display(), "workspace ready");
                let outcome = self
                    .run_stages(&deployment_id, request, &workspace, &mut state, sink)
                    .await;
                if outcome.is_ok() {
                    state = state.advance();
                }
                self.cleanup(&deployment_id, &workspace, sink).await;
                outcome
            }
            Err(e) => {
                state = PipelineState::Failed;
                sink.log(&format!("Error creating workspace: {e}"));
                sink.step(Stage::Clone.index(), StepStatus::Error);
                Err(e)
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        self.finish(deployment_id, state, outcome, duration_ms, sink)
    }

    async fn run_stages(
        &self,
        deployment_id: &str,
        request: &DeploymentRequest,
        workspace: &Workspace,
        state: &mut PipelineState,
        sink: &dyn ProgressSink,
    ) -> Result<String> {
        let fetch = self.fetcher.fetch(&request.repository_url, workspace, sink);
        self.stage(deployment_id, Stage::Clone, state, sink, fetch)
            .await?;

        let setup = self.installer.setup(workspace, sink);
        let classification = self
            .stage(deployment_id, Stage::Install, state, sink, setup)
            .await?;

        self.stage(deployment_id, Stage::Classify, state, sink, async { Ok(()) })
            .await?;

        let configure = self.manifests.configure(workspace, classification, sink);
        self.stage(deployment_id, Stage::Configure, state, sink, configure)
            .await?;

        let deploy = self.deploy(workspace, sink);
        self.stage(deployment_id, Stage::Deploy, state, sink, deploy)
            .await
    }

    /// Run one stage future, converting a panic into an `Unexpected` error and
    /// reporting the step transitions.
    async fn stage<T, F>(
        &self,
        deployment_id: &str,
        stage: Stage,
        state: &mut PipelineState,
        sink: &dyn ProgressSink,
        work: F,
    ) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        // Step 0 is already pending from run start.
        if stage.reports_pending() && stage != Stage::Clone {
            sink.step(stage.index(), StepStatus::Pending);
        }
        *state = state.advance();
        debug_assert_eq!(*state, stage.state());
        obs::emit_stage_started(deployment_id, stage);
        debug!(state = ?*state, "stage started");
        let started = Instant::now();

        let result = match AssertUnwindSafe(work).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => Err(DeployError::Unexpected(format!(
                "{} stage panicked: {}",
                stage.name(),
                panic_message(payload.as_ref())
            ))),
        };

        obs::emit_stage_finished(
            deployment_id,
            stage,
            started.elapsed().as_millis() as u64,
            result.is_ok(),
        );
        let status = if result.is_ok() {
            StepStatus::Success
        } else {
            *state = PipelineState::Failed;
            StepStatus::Error
        };
        sink.step(stage.index(), status);
        result
    }

    async fn deploy(&self, workspace: &Workspace, sink: &dyn ProgressSink) -> Result<String> {
        if let Err(e) = self.api.preflight() {
            sink.log(&format!("Error deploying: {e}"));
            return Err(e);
        }

        sink.log("Preparing files for Vercel deployment...");
        let artifact = match self.packager.collect(workspace.path()).await {
            Ok(artifact) => artifact,
            Err(e) => {
                sink.log(&format!("Error deploying: {e}"));
                return Err(e);
            }
        };
        debug!(
            files = artifact.files.len(),
            bytes = artifact.total_bytes,
            skipped = artifact.skipped,
            digest = %artifact.digest(),
            "workspace packaged"
        );
        sink.log(&format!(
            "Prepared {} files for deployment",
            artifact.files.len()
        ));

        match self.api.submit(workspace, artifact.files, sink).await {
            Ok(url) => {
                sink.log(&format!("Deployment successful! URL: {url}"));
                Ok(url)
            }
            Err(e) => {
                sink.log(&format!("Error deploying: {e}"));
                Err(e)
            }
        }
    }

    async fn cleanup(&self, deployment_id: &str, workspace: &Workspace, sink: &dyn ProgressSink) {
        let result = AssertUnwindSafe(self.workspaces.destroy(workspace))
            .catch_unwind()
            .await;
        match result {
            Ok(Ok(())) => sink.log("Cleaned up temporary files"),
            Ok(Err(e)) => {
                obs::emit_cleanup_error(deployment_id, &e);
                sink.log(&format!(
                    "Warning: Could not clean up temporary directory: {e}"
                ));
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                obs::emit_cleanup_error(deployment_id, &message);
                sink.log(&format!(
                    "Warning: Could not clean up temporary directory: {message}"
                ));
            }
        }
    }

    fn finish(
        &self,
        deployment_id: String,
        state: PipelineState,
        outcome: Result<String>,
        duration_ms: u64,
        sink: &dyn ProgressSink,
    ) -> PipelineResult {
        debug_assert!(state.is_terminal());
        debug!(state = ?state, "run finished");

        match outcome {
            Ok(url) => {
                obs::emit_deployment_finished(&deployment_id, duration_ms, true, "");
                sink.emit(ProgressEvent::Result {
                    success: true,
                    message: SUCCESS_MESSAGE.to_string(),
                    deployed_url: Some(url.clone()),
                });
                PipelineResult {
                    deployment_id,
                    success: true,
                    deployed_url: Some(url),
                    error: None,
                    duration_ms,
                }
            }
            Err(e) => {
                obs::emit_deployment_finished(
                    &deployment_id,
                    duration_ms,
                    false,
                    &e.kind().to_string(),
                );
                sink.emit(ProgressEvent::Result {
                    success: false,
                    message: format!("Deployment failed: {e}"),
                    deployed_url: None,
                });
                PipelineResult {
                    deployment_id,
                    success: false,
                    deployed_url: None,
                    error: Some(e),
                    duration_ms,
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
