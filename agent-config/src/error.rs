//! Error types for configuration loading and persistence.

use thiserror::Error;

/// Errors emitted while loading or storing agent configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure while reading or writing the settings file.
    #[error("i/o error: {source}")]
    Io {
        /// Source [`std::io::Error`].
        #[from]
        source: std::io::Error,
    },
    /// Settings file contents could not be decoded.
    #[error("serialization error: {source}")]
    Serialization {
        /// Source [`serde_json::Error`].
        #[from]
        source: serde_json::Error,
    },
    /// Settings decoded but failed validation.
    #[error("invalid agent configuration: {0}")]
    Invalid(&'static str),
}

/// Result alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
