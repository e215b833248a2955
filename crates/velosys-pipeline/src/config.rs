//! Deployment configuration.
//!
//! Credentials are read from the environment once, when the configuration is
//! built, and then injected into the fetcher and submitter. No stage reads the
//! environment on its own.

use std::fmt;
use std::path::PathBuf;

/// Default deployment API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.vercel.com/v13/deployments";

/// Default prefix for workspace directory names.
pub const DEFAULT_WORKSPACE_PREFIX: &str = "velosys";

/// Environment variable holding the source-host access token.
pub const ENV_SOURCE_TOKEN: &str = "GITHUB_TOKEN";
/// Environment variable holding the deployment platform API token.
pub const ENV_API_TOKEN: &str = "VERCEL_TOKEN";
/// Environment variable holding the deployment platform team identifier.
pub const ENV_TEAM_ID: &str = "VERCEL_TEAM_ID";
/// Environment variable overriding the deployment API endpoint.
pub const ENV_API_URL: &str = "VERCEL_API_URL";
/// Environment variable overriding the workspace root directory.
pub const ENV_TEMP_ROOT: &str = "VELOSYS_TEMP_ROOT";
/// Environment variable overriding the workspace directory prefix.
pub const ENV_WORKSPACE_PREFIX: &str = "VELOSYS_WORKSPACE_PREFIX";

/// Configuration for a deployment pipeline.
#[derive(Clone)]
pub struct DeployConfig {
    /// Token embedded in clone URLs for private repositories.
    pub source_token: Option<String>,
    /// Bearer token for the deployment API. Required at submission.
    pub api_token: Option<String>,
    /// Optional team identifier added to the deployment payload.
    pub team_id: Option<String>,
    /// Deployment API endpoint.
    pub api_url: String,
    /// Directory under which workspaces are created.
    pub temp_root: PathBuf,
    /// Prefix for workspace directory names.
    pub workspace_prefix: String,
}

impl Default for DeployConfig {
    fn default() -> Self {
        DeployConfig {
            source_token: None,
            api_token: None,
            team_id: None,
            api_url: DEFAULT_API_URL.to_string(),
            temp_root: std::env::temp_dir(),
            workspace_prefix: DEFAULT_WORKSPACE_PREFIX.to_string(),
        }
    }
}

impl DeployConfig {
    /// Build a configuration from environment variables.
    ///
    /// Empty values are treated as absent.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();
        DeployConfig {
            source_token: var(ENV_SOURCE_TOKEN),
            api_token: var(ENV_API_TOKEN),
            team_id: var(ENV_TEAM_ID),
            api_url: var(ENV_API_URL).unwrap_or(defaults.api_url),
            temp_root: var(ENV_TEMP_ROOT)
                .map(PathBuf::from)
                .unwrap_or(defaults.temp_root),
            workspace_prefix: var(ENV_WORKSPACE_PREFIX).unwrap_or(defaults.workspace_prefix),
        }
    }

    pub fn with_source_token(mut self, token: impl Into<String>) -> Self {
        self.source_token = Some(token.into());
        self
    }

    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    pub fn with_team_id(mut self, team_id: impl Into<String>) -> Self {
        self.team_id = Some(team_id.into());
        self
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    pub fn with_temp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.temp_root = root.into();
        self
    }

    pub fn with_workspace_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.workspace_prefix = prefix.into();
        self
    }
}

impl fmt::Debug for DeployConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("DeployConfig")
            .field("source_token", &redact(&self.source_token))
            .field("api_token", &redact(&self.api_token))
            .field("team_id", &self.team_id)
            .field("api_url", &self.api_url)
            .field("temp_root", &self.temp_root)
            .field("workspace_prefix", &self.workspace_prefix)
            .finish()
    }
}
