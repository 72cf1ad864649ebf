//! Error types for the tuner core.

use thiserror::Error;

/// Result type for tuner core operations.
pub type TunerResult<T> = Result<T, TunerError>;

/// Errors that can occur in the tuner core.
///
/// Validation and persistence problems of the reference pitch are not errors at this level:
/// they are reported as `ErrorOccurred` events and a `false` return.
#[derive(Debug, Error)]
pub enum TunerError {
    /// A string index outside the six-string table.
    #[error("invalid string index: {index}")]
    InvalidStringIndex {
        /// The rejected index.
        index: usize,
    },

    /// The reference pitch manager was torn down.
    #[error("reference pitch manager has been released")]
    ManagerReleased,

    /// A configuration value is out of its allowed range.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// What is wrong with it.
        message: String,
    },
}

impl TunerError {
    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}
