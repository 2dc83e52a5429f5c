//! Error types for analysis and report composition.

use thiserror::Error;

/// Result type for report operations.
pub type Result<T> = std::result::Result<T, ReportError>;

/// Errors that can occur while analyzing a run or composing its report.
#[derive(Error, Debug)]
pub enum ReportError {
    /// Numerical precondition failed, e.g. smoothing scale below the grid.
    #[error(transparent)]
    Math(#[from] km_math::MathError),

    /// The run holds no samples.
    #[error("run has no samples to analyze")]
    EmptyRun,

    /// Plot rendering failed.
    #[error("render error: {0}")]
    Render(String),

    /// Record serialization failed.
    #[error(transparent)]
    Record(#[from] km_record::RecordError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ReportError {
    /// True when the failure is an analysis precondition (bad settings for this run).
    pub fn is_invalid_parameter(&self) -> bool {
        matches!(
            self,
            ReportError::Math(km_math::MathError::InvalidParameter { .. })
        )
    }
}
