//! Error taxonomy shared by every stage of the acquisition pipeline.

use std::io;
use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

/// Error types for profile resolution, catalog paging and media saves
#[derive(Error, Debug)]
pub enum VscoError {
    #[error("Request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("Unexpected status {status} from {url}")]
    Status { url: String, status: StatusCode },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Filesystem error at {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Unsupported media: {0}")]
    UnsupportedMedia(String),

    #[error("Invalid URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

/// Result type for acquisition operations
pub type VscoResult<T> = Result<T, VscoError>;

impl VscoError {
    pub(crate) fn transport(url: impl Into<String>, err: impl std::fmt::Display) -> Self {
        VscoError::Transport {
            url: url.into(),
            message: err.to_string(),
        }
    }

    pub(crate) fn filesystem(path: impl Into<PathBuf>, source: io::Error) -> Self {
        VscoError::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// Whether the failure is transient and a page fetch may be retried.
    ///
    /// Network failures, 429 and 5xx responses qualify. Other statuses,
    /// decode and filesystem failures never do.
    pub fn is_retryable(&self) -> bool {
        match self {
            VscoError::Transport { .. } => true,
            VscoError::Status { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            _ => false,
        }
    }
}

impl From<serde_json::Error> for VscoError {
    fn from(err: serde_json::Error) -> Self {
        VscoError::Decode(err.to_string())
    }
}
