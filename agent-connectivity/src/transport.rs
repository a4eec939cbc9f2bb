//! Seams to the transport layer that carries agent to server traffic.

use std::collections::HashMap;
use std::sync::Arc;

use agent_primitives::{ServerEndpoint, ServerLocator};
use async_trait::async_trait;

use crate::error::{CommError, CommResult};
use crate::wire::{
    ConnectAgentRequest, ConnectAgentResults, PingRequest, PingResponse, RegistrationRequest,
    RegistrationResults, ServerIdentity,
};

/// A live handle to the server the agent is currently pointed at.
///
/// Implementations own the wire protocol; the connectivity components only
/// re-target the handle and issue the core service calls through it.
#[async_trait]
pub trait ServerConnection: Send + Sync {
    /// Locator URI the handle currently targets.
    fn remote_endpoint(&self) -> String;

    /// Re-targets the handle.
    ///
    /// # Errors
    ///
    /// Returns [`CommError`] when the URI is not usable by the transport.
    fn set_remote_endpoint(&self, uri: &str) -> CommResult<()>;

    /// Sets or clears the token attached to outgoing requests.
    fn set_security_token(&self, token: Option<String>);

    /// Registers the agent and obtains a fresh token.
    async fn register_agent(&self, request: RegistrationRequest) -> CommResult<RegistrationResults>;

    /// Announces that the agent is about to talk to this server.
    async fn connect_agent(&self, request: ConnectAgentRequest) -> CommResult<ConnectAgentResults>;

    /// Liveness check.
    async fn ping(&self, request: PingRequest) -> CommResult<PingResponse>;

    /// Fetches the failover list for `agent_name`; `None` means the server has none.
    async fn get_failover_list(&self, agent_name: &str) -> CommResult<Option<Vec<ServerEndpoint>>>;
}

/// Outbound command queue owned by the transport layer.
pub trait CommandSender: Send + Sync {
    /// Whether commands are currently flowing to the server.
    fn is_sending(&self) -> bool;

    /// Starts sending; returns `false` if sending was already enabled.
    fn start_sending(&self) -> bool;

    /// Stops sending, optionally draining queued commands first.
    fn stop_sending(&self, drain: bool);

    /// Whether the sender is polling the server to detect when it comes back.
    fn is_server_polling(&self) -> bool;

    /// Starts polling the server.
    fn start_server_polling(&self);

    /// Stops polling the server.
    fn stop_server_polling(&self);

    /// Handle to the server, absent while the transport is not set up.
    fn connection(&self) -> Option<Arc<dyn ServerConnection>>;
}

/// Asks a server to identify itself without going through the command queue.
#[async_trait]
pub trait ServerIdentifier: Send + Sync {
    /// Contacts the server at `locator` and returns its canonical identity.
    async fn identify(&self, locator: &ServerLocator) -> CommResult<ServerIdentity>;
}

/// Decides which send failures justify moving to another server.
pub trait FailoverPredicate: Send + Sync {
    /// Returns `true` when `error` means the server itself is unavailable.
    fn is_failover_worthy(&self, error: &CommError) -> bool;
}

/// Treats connect failures, dropped connections, and timeouts as failover worthy.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectFailurePredicate;

impl FailoverPredicate for ConnectFailurePredicate {
    fn is_failover_worthy(&self, error: &CommError) -> bool {
        matches!(
            error,
            CommError::CannotConnect { .. }
                | CommError::ConnectionLost { .. }
                | CommError::Timeout(_)
        )
    }
}

/// Command queued for delivery to the server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Command {
    name: String,
    config: HashMap<String, String>,
}

impl Command {
    /// Creates a command with an empty configuration.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: HashMap::new(),
        }
    }

    /// Command name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Looks up a configuration entry.
    #[must_use]
    pub fn config(&self, key: &str) -> Option<&str> {
        self.config.get(key).map(String::as_str)
    }

    /// Sets a configuration entry.
    pub fn set_config(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.config.insert(key.into(), value.into());
    }

    /// Removes a configuration entry, returning its previous value.
    pub fn remove_config(&mut self, key: &str) -> Option<String> {
        self.config.remove(key)
    }
}
