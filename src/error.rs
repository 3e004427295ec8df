//! Error types for the dp-tradeoff crate

use thiserror::Error;

/// Result alias used across the crate
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised by the noise engine, the simulation runner and the driver layer
#[derive(Error, Debug)]
pub enum Error {
    /// A precondition on sensitivity, epsilon, delta or run count was violated
    #[error("Invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// Mechanism name is not one of Laplace or Gaussian
    #[error("Unsupported mechanism: {0}")]
    UnsupportedMechanism(String),

    #[error("Dataset error: {0}")]
    DatasetError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Error::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }

    /// Whether this error is a local precondition violation of the core.
    ///
    /// These are raised before any randomness is consumed and retrying them
    /// cannot succeed.
    pub fn is_parameter_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidParameter { .. } | Error::UnsupportedMechanism(_)
        )
    }
}
