//! Error taxonomy for deployment runs.

use std::fmt;

/// Closed classification of a [`DeployError`], independent of its diagnostic text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Io,
    Fetch,
    Setup,
    Config,
    Submit,
    Unexpected,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Io => "io",
            ErrorKind::Fetch => "fetch",
            ErrorKind::Setup => "setup",
            ErrorKind::Config => "config",
            ErrorKind::Submit => "submit",
            ErrorKind::Unexpected => "unexpected",
        };
        f.write_str(name)
    }
}

/// Why a submission to the deployment API did not produce a URL.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitFailure {
    #[error("missing credential")]
    MissingCredential,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("deployment API returned {status}")]
    Status { status: u16, body: String },

    #[error("deployment response missing URL")]
    MissingUrl,
}

/// Errors produced by the deployment pipeline and its components.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("fetch failed: {reason}")]
    Fetch { reason: String },

    #[error("setup failed: {reason}")]
    Setup { reason: String },

    #[error("configure failed: {reason}")]
    Config { reason: String },

    #[error("submit failed: {0}")]
    Submit(#[from] SubmitFailure),

    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl DeployError {
    pub fn fetch(reason: impl Into<String>) -> Self {
        DeployError::Fetch {
            reason: reason.into(),
        }
    }

    pub fn setup(reason: impl Into<String>) -> Self {
        DeployError::Setup {
            reason: reason.into(),
        }
    }

    pub fn config(reason: impl Into<String>) -> Self {
        DeployError::Config {
            reason: reason.into(),
        }
    }

    /// The closed kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DeployError::Io(_) => ErrorKind::Io,
            DeployError::Fetch { .. } => ErrorKind::Fetch,
            DeployError::Setup { .. } => ErrorKind::Setup,
            DeployError::Config { .. } => ErrorKind::Config,
            DeployError::Submit(_) => ErrorKind::Submit,
            DeployError::Unexpected(_) => ErrorKind::Unexpected,
        }
    }
}

/// Result type for deployment operations.
pub type Result<T> = std::result::Result<T, DeployError>;
