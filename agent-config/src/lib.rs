//! Configuration management for agents.
//!
//! [`schema`] defines the typed settings and their defaults, [`loader`] owns
//! the durable store every runtime component reads and writes through.

#![warn(missing_docs, clippy::pedantic)]

mod error;
pub mod loader;
pub mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigStore;
pub use schema::AgentSettings;
