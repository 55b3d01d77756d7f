// Error types for runwatch.
// Separates upstream (GitHub API) failures from storage failures of the run cache.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RunwatchError {
    #[error("GitHub API error: {0}")]
    Api(#[from] reqwest::Error),

    #[error("Authentication failed: invalid or expired token")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limit exceeded, resets at {reset_at}")]
    RateLimited { reset_at: String },

    #[error("GitHub API request timed out")]
    Timeout,

    #[error("Missing GITHUB_TOKEN environment variable")]
    MissingToken,

    #[error("Invalid repository '{0}', expected owner/name")]
    InvalidRepo(String),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cache storage error: {0}")]
    Storage(String),

    #[error("{0}")]
    Other(String),
}

impl RunwatchError {
    /// Whether this error came from the cache store rather than the upstream.
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            RunwatchError::Io(_) | RunwatchError::Json(_) | RunwatchError::Storage(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, RunwatchError>;
