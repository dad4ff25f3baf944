// Error types for grade-manager.
// Covers GitHub API failures, cache and snapshot I/O, CSV import, and configuration.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GradeError {
    #[error("GitHub API error: {0}")]
    Api(#[from] reqwest::Error),

    #[error("Authentication failed: invalid or expired token")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limit exceeded, resets at {reset_at}")]
    RateLimited { reset_at: String },

    #[error("GitHub returned HTTP {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("Missing GitHub token (set GITHUB_TOKEN or github.token)")]
    MissingToken,

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid quiz result: {0}")]
    InvalidQuizResult(String),

    #[error("{0}")]
    Other(String),
}

impl GradeError {
    /// HTTP status code for errors that came back from GitHub.
    pub fn status(&self) -> Option<u16> {
        match self {
            GradeError::Unauthorized => Some(401),
            GradeError::NotFound(_) => Some(404),
            GradeError::RateLimited { .. } => Some(403),
            GradeError::Upstream { status, .. } => Some(*status),
            GradeError::Api(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, GradeError>;
