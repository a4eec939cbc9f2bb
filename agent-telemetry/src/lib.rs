//! Observability utilities for agents.
//!
//! The runtime only emits `tracing` events; binaries call [`init`] once to
//! decide where those events go.

#![warn(missing_docs, clippy::pedantic)]

use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Directive used when `RUST_LOG` is unset.
pub const DEFAULT_DIRECTIVE: &str = "info";

/// Subscriber options.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    directive: String,
    with_target: bool,
    ansi: bool,
}

impl TelemetryConfig {
    /// Creates a configuration with the given fallback filter directive.
    #[must_use]
    pub fn new(directive: impl Into<String>) -> Self {
        Self {
            directive: directive.into(),
            with_target: false,
            ansi: true,
        }
    }

    /// Includes the event target (module path) in each line.
    #[must_use]
    pub fn with_target(mut self, with_target: bool) -> Self {
        self.with_target = with_target;
        self
    }

    /// Enables or disables ANSI colouring.
    #[must_use]
    pub fn with_ansi(mut self, ansi: bool) -> Self {
        self.ansi = ansi;
        self
    }

    /// Returns the fallback filter directive.
    #[must_use]
    pub fn directive(&self) -> &str {
        &self.directive
    }

    fn filter(&self) -> Result<EnvFilter, TelemetryError> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => EnvFilter::try_new(&self.directive).map_err(|err| {
                TelemetryError::InvalidDirective {
                    directive: self.directive.clone(),
                    reason: err.to_string(),
                }
            }),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self::new(DEFAULT_DIRECTIVE)
    }
}

/// Errors raised while installing the subscriber.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The fallback directive could not be parsed.
    #[error("invalid log directive `{directive}`: {reason}")]
    InvalidDirective {
        /// Directive as configured.
        directive: String,
        /// Parser message.
        reason: String,
    },
    /// A global subscriber was already installed.
    #[error("tracing subscriber already installed: {0}")]
    AlreadyInstalled(String),
}

/// Installs a `fmt` subscriber filtered by `RUST_LOG` or the configured directive.
///
/// # Errors
///
/// Returns [`TelemetryError`] when the directive is invalid or a subscriber
/// has already been installed for this process.
pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter = config.filter()?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target)
        .with_ansi(config.ansi)
        .try_init()
        .map_err(|err| TelemetryError::AlreadyInstalled(err.to_string()))
}
