//! In-memory fakes for the pipeline's trait seams (testing only).
//!
//! Each fake records how it was called so tests can assert on ordering and
//! call counts without touching the network or spawning processes.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{DeployError, Result, SubmitFailure};
use crate::events::{ProgressEvent, ProgressSink, StepStatus};
use crate::fetch::SourceFetcher;
use crate::install::ProjectInstaller;
use crate::manifest::{ManifestOutcome, ManifestWriter};
use crate::package::FileEntry;
use crate::project::ProjectClassification;
use crate::runner::{CommandOutput, CommandRunner, CommandSpec};
use crate::submit::DeploymentApi;
use crate::workspace::{Workspace, WorkspaceManager, WorkspaceProvider};

/// How a stub stage behaves when called.
#[derive(Debug, Clone)]
enum Behavior {
    Succeed,
    Fail(String),
    Panic,
}

// ---------------------------------------------------------------------------
// MemorySink
// ---------------------------------------------------------------------------

/// Sink that keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn logs(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::Log { message } => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn steps(&self) -> Vec<(usize, StepStatus)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::Step { index, status } => Some((index, status)),
                _ => None,
            })
            .collect()
    }

    /// All terminal result events, in order.
    pub fn results(&self) -> Vec<ProgressEvent> {
        self.events()
            .into_iter()
            .filter(ProgressEvent::is_terminal)
            .collect()
    }
}

impl ProgressSink for MemorySink {
    fn emit(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}

// ---------------------------------------------------------------------------
// RecordingRunner
// ---------------------------------------------------------------------------

/// Command runner that records invocations and returns canned output.
///
/// Programs without a canned output exit 0 with empty output.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    outputs: HashMap<String, CommandOutput>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output(mut self, program: &str, output: CommandOutput) -> Self {
        self.outputs.insert(program.to_string(), output);
        self
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        self.calls.lock().unwrap().push(spec.clone());
        Ok(self
            .outputs
            .get(&spec.program)
            .cloned()
            .unwrap_or(CommandOutput {
                exit_code: 0,
                stdout: String::new(),
                stderr: String::new(),
                duration_ms: 0,
                success: true,
            }))
    }
}

// ---------------------------------------------------------------------------
// CountingWorkspaces
// ---------------------------------------------------------------------------

/// Real workspaces under a root, with create/destroy counters.
#[derive(Debug)]
pub struct CountingWorkspaces {
    inner: WorkspaceManager,
    created: Mutex<Vec<PathBuf>>,
    destroyed: AtomicUsize,
    fail_create: bool,
    fail_destroy: bool,
}

impl CountingWorkspaces {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            inner: WorkspaceManager::new(root, "velosys"),
            created: Mutex::new(Vec::new()),
            destroyed: AtomicUsize::new(0),
            fail_create: false,
            fail_destroy: false,
        }
    }

    /// Every `create` fails with an I/O error.
    pub fn failing(root: impl Into<PathBuf>) -> Self {
        Self {
            fail_create: true,
            ..Self::new(root)
        }
    }

    /// Workspaces are created normally but every `destroy` fails and leaves
    /// the directory in place.
    pub fn failing_destroy(root: impl Into<PathBuf>) -> Self {
        Self {
            fail_destroy: true,
            ..Self::new(root)
        }
    }

    pub fn created(&self) -> Vec<PathBuf> {
        self.created.lock().unwrap().clone()
    }

    pub fn destroy_count(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkspaceProvider for CountingWorkspaces {
    async fn create(&self, seed: &str) -> Result<Workspace> {
        if self.fail_create {
            return Err(
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only root").into(),
            );
        }
        let ws = self.inner.create(seed).await?;
        self.created.lock().unwrap().push(ws.path().to_path_buf());
        Ok(ws)
    }

    async fn destroy(&self, workspace: &Workspace) -> Result<()> {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
        if self.fail_destroy {
            return Err(
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "directory busy").into(),
            );
        }
        self.inner.destroy(workspace).await
    }
}

// ---------------------------------------------------------------------------
// StubFetcher
// ---------------------------------------------------------------------------

/// Fetcher that writes a fixed set of files instead of cloning.
#[derive(Debug)]
pub struct StubFetcher {
    files: Vec<(String, Vec<u8>)>,
    behavior: Behavior,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self {
            files: Vec::new(),
            behavior: Behavior::Succeed,
        }
    }

    pub fn with_file(mut self, relative_path: &str, contents: impl AsRef<[u8]>) -> Self {
        self.files
            .push((relative_path.to_string(), contents.as_ref().to_vec()));
        self
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            behavior: Behavior::Fail(reason.to_string()),
            ..Self::new()
        }
    }

    pub fn panicking() -> Self {
        Self {
            behavior: Behavior::Panic,
            ..Self::new()
        }
    }
}

impl Default for StubFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceFetcher for StubFetcher {
    async fn fetch(
        &self,
        repository_url: &str,
        workspace: &Workspace,
        sink: &dyn ProgressSink,
    ) -> Result<()> {
        sink.log(&format!("Cloning repository: {repository_url}"));
        match &self.behavior {
            Behavior::Succeed => {}
            Behavior::Fail(reason) => return Err(DeployError::fetch(reason.clone())),
            Behavior::Panic => panic!("stub fetcher panicked"),
        }
        for (rel, contents) in &self.files {
            let path = workspace.join(rel);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(path, contents).await?;
        }
        sink.log("Repository cloned successfully");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// StubInstaller / StubManifestWriter
// ---------------------------------------------------------------------------

/// Installer that reports a fixed classification without running anything.
#[derive(Debug)]
pub struct StubInstaller {
    classification: ProjectClassification,
    behavior: Behavior,
}

impl StubInstaller {
    pub fn classifying(classification: ProjectClassification) -> Self {
        Self {
            classification,
            behavior: Behavior::Succeed,
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            classification: ProjectClassification::NodeGeneric,
            behavior: Behavior::Fail(reason.to_string()),
        }
    }

    pub fn panicking() -> Self {
        Self {
            classification: ProjectClassification::NodeGeneric,
            behavior: Behavior::Panic,
        }
    }
}

#[async_trait]
impl ProjectInstaller for StubInstaller {
    async fn setup(
        &self,
        _workspace: &Workspace,
        _sink: &dyn ProgressSink,
    ) -> Result<ProjectClassification> {
        match &self.behavior {
            Behavior::Succeed => Ok(self.classification),
            Behavior::Fail(reason) => Err(DeployError::setup(reason.clone())),
            Behavior::Panic => panic!("stub installer panicked"),
        }
    }
}

/// Manifest writer that always fails.
#[derive(Debug)]
pub struct FailingManifestWriter {
    reason: String,
}

impl FailingManifestWriter {
    pub fn new(reason: &str) -> Self {
        Self {
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl ManifestWriter for FailingManifestWriter {
    async fn configure(
        &self,
        _workspace: &Workspace,
        _classification: ProjectClassification,
        _sink: &dyn ProgressSink,
    ) -> Result<ManifestOutcome> {
        Err(DeployError::config(self.reason.clone()))
    }
}

// ---------------------------------------------------------------------------
// StubDeploymentApi
// ---------------------------------------------------------------------------

/// Deployment API that records submissions and answers with a fixed outcome.
#[derive(Debug)]
pub struct StubDeploymentApi {
    outcome: std::result::Result<String, SubmitFailure>,
    credential: bool,
    submissions: Mutex<Vec<Vec<FileEntry>>>,
}

impl StubDeploymentApi {
    /// Accept every submission and return `url`.
    pub fn returning(url: &str) -> Self {
        Self {
            outcome: Ok(url.to_string()),
            credential: true,
            submissions: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(failure: SubmitFailure) -> Self {
        Self {
            outcome: Err(failure),
            ..Self::returning("")
        }
    }

    /// Fails preflight with a missing credential.
    pub fn without_credential() -> Self {
        Self {
            credential: false,
            ..Self::returning("")
        }
    }

    /// File lists of every submission made so far.
    pub fn submissions(&self) -> Vec<Vec<FileEntry>> {
        self.submissions.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeploymentApi for StubDeploymentApi {
    fn preflight(&self) -> Result<()> {
        if self.credential {
            Ok(())
        } else {
            Err(SubmitFailure::MissingCredential.into())
        }
    }

    async fn submit(
        &self,
        _workspace: &Workspace,
        files: Vec<FileEntry>,
        _sink: &dyn ProgressSink,
    ) -> Result<String> {
        self.preflight()?;
        self.submissions.lock().unwrap().push(files);
        self.outcome.clone().map_err(DeployError::from)
    }
}
