//! Cloning the source repository into a workspace.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use url::Url;

use crate::error::{DeployError, Result};
use crate::events::ProgressSink;
use crate::runner::{CommandRunner, CommandSpec};
use crate::workspace::Workspace;

/// Populates a workspace with a working tree of the repository.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(
        &self,
        repository_url: &str,
        workspace: &Workspace,
        sink: &dyn ProgressSink,
    ) -> Result<()>;
}

/// Fetcher that shells out to `git clone`.
pub struct GitFetcher {
    runner: Arc<dyn CommandRunner>,
    token: Option<String>,
}

impl GitFetcher {
    pub fn new(runner: Arc<dyn CommandRunner>, token: Option<String>) -> Self {
        Self { runner, token }
    }

    /// Build the `git clone` invocation for this repository and workspace.
    pub fn clone_command(
        &self,
        repository_url: &str,
        workspace: &Workspace,
    ) -> Result<CommandSpec> {
        let url = clone_url(repository_url, self.token.as_deref())?;
        Ok(CommandSpec::new("git")
            .arg("clone")
            .arg(url)
            .arg(workspace.path().to_string_lossy())
            .env("GIT_TERMINAL_PROMPT", "0"))
    }

    fn scrub(&self, text: &str) -> String {
        match self.token.as_deref() {
            Some(token) if !token.is_empty() => text.replace(token, "***"),
            _ => text.to_string(),
        }
    }
}

#[async_trait]
impl SourceFetcher for GitFetcher {
    async fn fetch(
        &self,
        repository_url: &str,
        workspace: &Workspace,
        sink: &dyn ProgressSink,
    ) -> Result<()> {
        sink.log(&format!("Cloning repository: {repository_url}"));

        let spec = match self.clone_command(repository_url, workspace) {
            Ok(spec) => spec,
            Err(e) => {
                sink.log(&format!("Error cloning repository: {e}"));
                return Err(e);
            }
        };
        let output = match self.runner.run(&spec).await {
            Ok(output) => output,
            Err(e) => {
                let reason = self.scrub(&e.to_string());
                sink.log(&format!("Error cloning repository: {reason}"));
                return Err(DeployError::fetch(format!("failed to run git: {reason}")));
            }
        };

        if !output.passed() {
            let reason = self.scrub(output.diagnostic());
            sink.log(&format!("Error cloning repository: {reason}"));
            return Err(DeployError::fetch(format!(
                "git clone exited with code {}: {reason}",
                output.exit_code
            )));
        }

        debug!(duration_ms = output.duration_ms, "clone finished");
        sink.log("Repository cloned successfully");
        Ok(())
    }
}

/// Compute the URL handed to `git clone`.
///
/// With a token and an `http`/`https` URL, the token is embedded as userinfo on
/// the same host and path. Other schemes (e.g. `file://`) are passed through.
pub fn clone_url(repository_url: &str, token: Option<&str>) -> Result<String> {
    let mut url = Url::parse(repository_url)
        .map_err(|e| DeployError::fetch(format!("invalid repository URL: {e}")))?;

    let token = match token {
        Some(t) if !t.is_empty() => t,
        _ => return Ok(repository_url.to_string()),
    };
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Ok(repository_url.to_string());
    }

    url.set_username(token)
        .and_then(|_| url.set_password(None))
        .map_err(|_| DeployError::fetch("repository URL cannot carry credentials"))?;
    url.set_query(None);
    url.set_fragment(None);
    Ok(url.to_string())
}
