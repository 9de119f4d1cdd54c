//! Common error types for the wikivox pipeline

use thiserror::Error;

/// Common result type for wikivox operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across pipeline components
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Required external tool missing from PATH
    #[error("Required tool not found: {0}")]
    ToolMissing(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input or malformed game data
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Two non-empty values disagree during a merge; never resolved silently
    #[error("Merge conflict on {field} for '{key}': '{left}' vs '{right}'")]
    MergeConflict {
        field: String,
        key: String,
        left: String,
        right: String,
    },

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::InvalidInput(format!("JSON error: {}", e))
    }
}
