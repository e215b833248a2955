//! velosys - deploy a public repository to the web
//!
//! ## Commands
//!
//! - `deploy`: clone, classify, install, configure and submit a repository
//! - `inspect`: preview what a deployment of a local directory would do

mod console;
mod inspect;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, Level};
use velosys_pipeline::telemetry::init_tracing;
use velosys_pipeline::{DeployConfig, DeploymentPipeline, DeploymentRequest};

use crate::console::ConsoleSink;

#[derive(Parser)]
#[command(name = "velosys")]
#[command(version = velosys_pipeline::VERSION)]
#[command(about = "Deploy a public git repository to the web", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON log lines and JSON progress events
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy a repository
    Deploy {
        /// Repository URL, e.g. https://github.com/owner/repo
        repo_url: String,

        /// Host the repository URL must be on
        #[arg(long, default_value = "github.com")]
        source_host: String,

        /// Accept repository URLs on any host
        #[arg(long)]
        any_host: bool,

        #[command(flatten)]
        settings: DeploySettings,
    },

    /// Preview classification, manifest and packaging for a local directory
    Inspect {
        /// Project directory
        #[arg(default_value = ".")]
        path: PathBuf,
    },
}

/// Command-line overrides on top of [`DeployConfig::from_env`].
#[derive(Args, Default)]
struct DeploySettings {
    /// Token for cloning private repositories [env: GITHUB_TOKEN]
    #[arg(long)]
    source_token: Option<String>,

    /// Deployment API token [env: VERCEL_TOKEN]
    #[arg(long)]
    api_token: Option<String>,

    /// Team to deploy under [env: VERCEL_TEAM_ID]
    #[arg(long)]
    team_id: Option<String>,

    /// Deployment API endpoint [env: VERCEL_API_URL]
    #[arg(long)]
    api_url: Option<String>,

    /// Directory under which workspaces are created [env: VELOSYS_TEMP_ROOT]
    #[arg(long)]
    temp_root: Option<PathBuf>,

    /// Prefix for workspace directory names [env: VELOSYS_WORKSPACE_PREFIX]
    #[arg(long)]
    workspace_prefix: Option<String>,
}

impl DeploySettings {
    fn apply(self, base: DeployConfig) -> DeployConfig {
        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        DeployConfig {
            source_token: non_empty(self.source_token).or(base.source_token),
            api_token: non_empty(self.api_token).or(base.api_token),
            team_id: non_empty(self.team_id).or(base.team_id),
            api_url: non_empty(self.api_url).unwrap_or(base.api_url),
            temp_root: self.temp_root.unwrap_or(base.temp_root),
            workspace_prefix: non_empty(self.workspace_prefix).unwrap_or(base.workspace_prefix),
        }
    }
}

/// Reject URLs outside the expected source host before any work is done.
fn check_source_host(request: &DeploymentRequest, host: &str, any_host: bool) -> Result<()> {
    if any_host || request.is_hosted_on(host) {
        Ok(())
    } else {
        anyhow::bail!(
            "Invalid repository URL: {} is not a {host} repository (use --any-host to allow it)",
            request.repository_url
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    init_tracing(cli.json, level);

    match cli.command {
        Commands::Deploy {
            repo_url,
            source_host,
            any_host,
            settings,
        } => cmd_deploy(repo_url, &source_host, any_host, settings, cli.json).await,
        Commands::Inspect { path } => cmd_inspect(&path, cli.json).await,
    }
}

async fn cmd_deploy(
    repo_url: String,
    source_host: &str,
    any_host: bool,
    settings: DeploySettings,
    json: bool,
) -> Result<()> {
    let request = DeploymentRequest::new(repo_url);
    check_source_host(&request, source_host, any_host)?;

    let config = settings.apply(DeployConfig::from_env());
    info!(?config, "starting deployment");
    let pipeline =
        DeploymentPipeline::from_config(&config).context("failed to set up deployment pipeline")?;

    let result = pipeline.run(&request, &ConsoleSink::new(json)).await;
    match result.error {
        None => Ok(()),
        Some(e) => {
            let context = format!("deployment {} failed", result.deployment_id);
            Err(anyhow::Error::new(e).context(context))
        }
    }
}

async fn cmd_inspect(path: &std::path::Path, json: bool) -> Result<()> {
    let report = inspect::inspect(path).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report.render()?);
    }
    Ok(())
}
