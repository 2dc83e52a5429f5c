//! Error types for record persistence.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while writing or reading run records.
#[derive(Error, Debug)]
pub enum RecordError {
    /// Filesystem error, with the path that failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error.
    #[error("invalid record JSON{}: {source}", path.as_ref().map(|p| format!(" in {}", p.display())).unwrap_or_default())]
    Json {
        path: Option<PathBuf>,
        #[source]
        source: serde_json::Error,
    },

    /// Record written by an incompatible schema.
    #[error("unsupported record version: {version} (supported: {supported})")]
    UnsupportedVersion { version: String, supported: String },

    /// Record file does not exist.
    #[error("record not found: {0}")]
    NotFound(PathBuf),

    /// Every suffixed key for a start minute is already taken.
    #[error("no free record key left for {0}")]
    KeyExhausted(String),
}

impl RecordError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RecordError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for record operations.
pub type Result<T> = std::result::Result<T, RecordError>;
