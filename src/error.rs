//! Error types for the TICA library

use thiserror::Error;

/// Result type alias for this crate
pub type Result<T> = std::result::Result<T, TicaError>;

/// Main error type for the library
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TicaError {
    /// Conflicting or out-of-range options
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// More output dimensions requested than the input provides
    #[error(
        "Requested more output dimensions ({requested}) than dimension of input data ({available})"
    )]
    DimensionMismatch { requested: usize, available: usize },

    /// Input data with a different number of features than seen before
    #[error("Input has {found} features, expected {expected}")]
    FeatureMismatch { expected: usize, found: usize },

    /// A result was requested before any data was accumulated
    #[error("Estimator has not seen any data yet. Call estimate() or partial_fit() first")]
    NotEstimated,

    /// Output dimension depends on the cumulative variance which is not known yet
    #[error(
        "Requested dimension, but the dimension depends on the cumulative variance and the \
         estimator has not yet been diagonalized. Call estimate() before"
    )]
    DimensionIndeterminate,

    /// Eigen-decomposition failed or produced an invalid result
    #[error("Numerical error: {0}")]
    Numerical(String),

    /// Not enough frames to form a single time-lagged pair
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// Operation not available for this estimator variant
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

impl TicaError {
    /// Whether the error can be resolved by feeding data and estimating again
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            TicaError::NotEstimated
                | TicaError::DimensionIndeterminate
                | TicaError::InsufficientData(_)
        )
    }
}
