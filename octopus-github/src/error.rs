//! Error types for GitHub operations

use thiserror::Error;

/// Result type for GitHub operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("GitHub API error: {0}")]
    Api(#[from] octocrab::Error),

    #[error("GitHub authentication error: {0}")]
    Auth(String),

    #[error("Missing environment variable: {0}")]
    MissingEnv(String),

    #[error("Pull request #{0} not found")]
    PrNotFound(u64),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("{0}")]
    Other(String),
}

impl From<std::env::VarError> for Error {
    fn from(err: std::env::VarError) -> Self {
        Error::MissingEnv(err.to_string())
    }
}

/// Surface GitHub failures through the flow's service trait
impl From<Error> for octopus_core::Error {
    fn from(err: Error) -> Self {
        octopus_core::Error::GitHub(err.to_string())
    }
}
