//! Typed error hierarchy for the repository seeder.
//!
//! Three types cover the three layers a setup job passes through:
//! - `GitHubError`: a single failed call against the hosting API
//! - `UploadError`: one file that exhausted its retry budget
//! - `SetupError`: anything that aborts a setup job as a whole

use thiserror::Error;
use uuid::Uuid;

/// A failed request against the hosting API.
///
/// `status` is `None` for transport failures (DNS, connect, timeout) where no
/// HTTP response was received.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", describe(.status, .message))]
pub struct GitHubError {
    pub status: Option<u16>,
    pub message: String,
}

fn describe(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("GitHub API returned {}: {}", code, message),
        None => format!("GitHub request failed: {}", message),
    }
}

impl GitHubError {
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for GitHubError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::http(status.as_u16(), err.to_string()),
            None => Self::transport(err.to_string()),
        }
    }
}

/// A file upload that failed on every attempt.
#[derive(Debug, Clone, Error)]
#[error("Failed to upload {path} after {attempts} attempts: {last}")]
pub struct UploadError {
    pub path: String,
    pub attempts: u32,
    #[source]
    pub last: GitHubError,
}

/// Errors that abort a repository setup job.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("Invalid GitHub token format")]
    InvalidToken,

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error(transparent)]
    GitHub(#[from] GitHubError),

    #[error("Failed to upload {failed} of {total} files")]
    IncompleteUpload { failed: usize, total: usize },

    #[error("Failed to walk staging directory {path}: {source}")]
    Walk {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Build pipeline error: {0}")]
    Pipeline(String),

    #[error("Job {0} already exists")]
    DuplicateJob(Uuid),

    #[error("Setup cancelled: server is shutting down")]
    Cancelled,
}

impl SetupError {
    /// Message recorded on the failed step, with hints for the statuses users
    /// can actually act on.
    pub fn user_message(&self) -> String {
        match self {
            SetupError::GitHub(err) => match err.status {
                Some(422) => "Repository name already exists or is invalid. \
                              Choose a different repository name."
                    .to_string(),
                Some(401) => "Invalid GitHub token. Check that the token is correct \
                              and has the 'repo' scope."
                    .to_string(),
                Some(403) => format!(
                    "GitHub refused the request (rate limit or missing permissions): {}",
                    err.message
                ),
                _ => err.message.clone(),
            },
            other => other.to_string(),
        }
    }
}
