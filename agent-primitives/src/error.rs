//! Shared error definitions for agent primitives.

use thiserror::Error;

/// Result alias used throughout the agent runtime.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while parsing or validating primitive types.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// A failover list entry could not be parsed.
    #[error("invalid server endpoint `{input}`: {reason}")]
    InvalidEndpoint {
        /// The offending text.
        input: String,
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// The transport name is not one the agent knows how to speak.
    #[error("unknown transport `{0}`")]
    UnknownTransport(String),

    /// A server locator URI failed validation.
    #[error("invalid server locator `{uri}`: {reason}")]
    InvalidLocator {
        /// The offending URI.
        uri: String,
        /// Human-readable reason for rejection.
        reason: String,
    },
}
