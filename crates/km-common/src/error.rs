//! Error types for shared value parsing.

use thiserror::Error;

/// Result type alias for km-common operations.
pub type Result<T> = std::result::Result<T, CommonError>;

/// Errors raised while parsing or validating shared types.
#[derive(Error, Debug)]
pub enum CommonError {
    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A firing schedule that cannot be executed.
    #[error("invalid profile '{name}': {reason}")]
    InvalidProfile { name: String, reason: String },

    /// An unknown firing state string.
    #[error("unknown firing state: {0}")]
    UnknownState(String),
}
