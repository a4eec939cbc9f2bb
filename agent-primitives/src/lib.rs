//! Core value types shared across the fleet agent runtime.

#![warn(missing_docs, clippy::pedantic)]

mod endpoint;
mod error;
mod locator;
mod transport;
mod version;

/// Candidate server entry as advertised in a failover list.
pub use endpoint::ServerEndpoint;
/// Error type and result alias shared across the workspace.
pub use error::{Error, Result};
/// Full address of the server the agent talks to, including transport details.
pub use locator::ServerLocator;
/// Transport protocols understood by the agent.
pub use transport::Transport;
/// Build identification sent to servers during registration.
pub use version::AgentVersion;
