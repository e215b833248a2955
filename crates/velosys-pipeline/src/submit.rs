//! Deployment API client.
//!
//! One authenticated POST per run, never retried. Non-success responses are
//! reported with status and body on the progress channel.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::DeployConfig;
use crate::error::{DeployError, Result, SubmitFailure};
use crate::events::ProgressSink;
use crate::package::FileEntry;
use crate::workspace::Workspace;

const USER_AGENT: &str = concat!("velosys/", env!("CARGO_PKG_VERSION"));

/// Sends a packaged workspace to the deployment platform.
#[async_trait]
pub trait DeploymentApi: Send + Sync {
    /// Fail fast when the submission cannot possibly succeed, before any
    /// packaging work is done.
    fn preflight(&self) -> Result<()> {
        Ok(())
    }

    /// Submit the files and return the public URL of the deployment.
    async fn submit(
        &self,
        workspace: &Workspace,
        files: Vec<FileEntry>,
        sink: &dyn ProgressSink,
    ) -> Result<String>;
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProjectSettings {
    pub framework: Option<String>,
}

/// Request body of the deployment API.
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentPayload {
    pub name: String,
    pub files: Vec<FileEntry>,
    #[serde(rename = "projectSettings")]
    pub project_settings: ProjectSettings,
    #[serde(rename = "teamId", skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeploymentResponse {
    #[serde(default)]
    url: Option<String>,
}

/// Deployment name derived from the workspace directory name: lower-cased,
/// anything outside `[a-z0-9-]` replaced by `-`.
pub fn deployment_name(workspace: &Workspace) -> String {
    workspace
        .dir_name()
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// [`DeploymentApi`] over HTTPS with a bearer token.
pub struct HttpSubmitter {
    client: reqwest::Client,
    api_url: String,
    token: Option<String>,
    team_id: Option<String>,
}

impl HttpSubmitter {
    pub fn new(config: &DeployConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| SubmitFailure::Transport(e.to_string()))?;
        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            token: config.api_token.clone(),
            team_id: config.team_id.clone(),
        })
    }

    pub fn payload(&self, workspace: &Workspace, files: Vec<FileEntry>) -> DeploymentPayload {
        DeploymentPayload {
            name: deployment_name(workspace),
            files,
            project_settings: ProjectSettings { framework: None },
            team_id: self.team_id.clone(),
        }
    }

    fn token(&self) -> Result<&str> {
        self.token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(DeployError::Submit(SubmitFailure::MissingCredential))
    }
}

#[async_trait]
impl DeploymentApi for HttpSubmitter {
    fn preflight(&self) -> Result<()> {
        self.token().map(|_| ())
    }

    async fn submit(
        &self,
        workspace: &Workspace,
        files: Vec<FileEntry>,
        sink: &dyn ProgressSink,
    ) -> Result<String> {
        let token = self.token()?;
        let payload = self.payload(workspace, files);

        sink.log("Sending deployment request to Vercel...");
        debug!(name = %payload.name, files = payload.files.len(), "posting deployment");

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| SubmitFailure::Transport(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            sink.log(&format!("Response status: {}", status.as_u16()));
            sink.log(&format!("Response data: {}", pretty_body(&body)));
            return Err(SubmitFailure::Status {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let parsed: DeploymentResponse = response
            .json()
            .await
            .map_err(|e| SubmitFailure::Transport(format!("invalid response body: {e}")))?;
        let url = parsed
            .url
            .filter(|u| !u.is_empty())
            .ok_or(SubmitFailure::MissingUrl)?;

        Ok(format!("https://{url}"))
    }
}

/// Re-indent a JSON body for the log; other bodies are returned as-is.
fn pretty_body(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| serde_json::to_string_pretty(&v).ok())
        .unwrap_or_else(|| body.to_string())
}
