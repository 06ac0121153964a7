//! Error types for Octopus

use thiserror::Error;

/// Result type alias for Octopus operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for Octopus operations
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Git plumbing error
    #[error("Git error: {0}")]
    Git(String),

    /// Agent execution error
    #[error("Agent error: {0}")]
    Agent(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// An agent answered with output that does not satisfy the JSON contract
    #[error("Contract error: {0}")]
    Contract(String),

    /// Flow sequencing error (invalid transition, missing state)
    #[error("Flow error: {0}")]
    Flow(String),

    /// Failure reported by the GitHub collaborator
    #[error("GitHub error: {0}")]
    GitHub(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl From<git2::Error> for Error {
    fn from(err: git2::Error) -> Self {
        Error::Git(err.message().to_string())
    }
}
