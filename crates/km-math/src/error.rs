//! Error types for numerical routines.

use thiserror::Error;

/// Result type alias for math operations.
pub type Result<T> = std::result::Result<T, MathError>;

/// Errors raised by numerical routines.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MathError {
    /// A parameter violates a precondition of the routine.
    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// Not enough points to perform the operation.
    #[error("need at least {needed} points, got {got}")]
    InsufficientData { needed: usize, got: usize },

    /// Paired series have different lengths.
    #[error("length mismatch: x has {x} points, y has {y}")]
    LengthMismatch { x: usize, y: usize },

    /// The abscissa decreases somewhere.
    #[error("abscissa is not non-decreasing at index {0}")]
    NonMonotonic(usize),

    /// The abscissa covers no interval.
    #[error("abscissa spans zero width")]
    ZeroSpan,
}
