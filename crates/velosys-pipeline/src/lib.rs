//! Velosys deployment pipeline
//!
//! Takes a public repository URL, clones it into an isolated workspace,
//! classifies and installs the project, ensures a `vercel.json` manifest,
//! packages the tree and submits it to the deployment API. Progress is
//! streamed as [`ProgressEvent`]s to a [`ProgressSink`].

pub mod config;
pub mod error;
pub mod events;
pub mod fakes;
pub mod fetch;
pub mod install;
pub mod manifest;
pub mod obs;
pub mod package;
pub mod pipeline;
pub mod project;
pub mod runner;
pub mod stage;
pub mod submit;
pub mod telemetry;
pub mod workspace;

pub use config::DeployConfig;
pub use error::{DeployError, ErrorKind, Result, SubmitFailure};
pub use events::{ChannelSink, ProgressEvent, ProgressSink, StepStatus, TracingSink};
pub use fetch::{clone_url, GitFetcher, SourceFetcher};
pub use install::{DependencyInstaller, ProjectInstaller};
pub use manifest::{DeploymentManifest, ManifestConfigurator, ManifestOutcome, ManifestWriter};
pub use package::{ArtifactPackager, FileEntry, PackagedArtifact};
pub use pipeline::{DeploymentPipeline, DeploymentRequest, PipelineResult};
pub use project::{InstallPlan, PackageManager, ProjectClassification};
pub use runner::{CommandOutput, CommandRunner, CommandSpec, SystemRunner};
pub use stage::{PipelineState, Stage};
pub use submit::{DeploymentApi, HttpSubmitter};
pub use workspace::{Workspace, WorkspaceManager, WorkspaceProvider};

/// Crate version, reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
