//! Payloads exchanged with the server's core service.

use agent_primitives::{AgentVersion, ServerEndpoint};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Registration payload emitted by agents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRequest {
    /// Name the agent registers under.
    pub agent_name: String,
    /// Address the agent listens on for server initiated commands.
    pub address: String,
    /// Port the agent listens on for server initiated commands.
    pub port: u16,
    /// Locator URI servers use to call back into the agent.
    pub remote_endpoint: String,
    /// Ask for a fresh token even if one is already held.
    pub regenerate_token: bool,
    /// Token held before this registration, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_token: Option<String>,
    /// Build of the registering agent.
    pub agent_version: AgentVersion,
}

/// Successful registration acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationResults {
    /// Token the agent must present from now on.
    pub agent_token: String,
    /// Authoritative failover list; `None` means the server has none for us.
    #[serde(default)]
    pub failover_list: Option<Vec<ServerEndpoint>>,
}

/// "I am about to talk to you" announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectAgentRequest {
    /// Name of the announcing agent.
    pub agent_name: String,
    /// Build of the announcing agent.
    pub agent_version: AgentVersion,
}

/// Reply to a connect announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectAgentResults {
    /// Server wall clock at the time of the reply.
    pub server_time: DateTime<Utc>,
    /// The server had marked this agent as down.
    pub is_down: bool,
}

/// Periodic liveness request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingRequest {
    /// Name of the pinging agent.
    pub agent_name: String,
    /// Ask the server to refresh this agent's availability.
    pub update_availability: bool,
    /// Ask the server to stamp its reply time.
    pub ack_requested: bool,
}

/// Ping acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingResponse {
    /// Server wall clock when the ping was answered.
    pub reply_server_timestamp: DateTime<Utc>,
}

/// Self-identification returned by a server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerIdentity {
    /// Canonical locator URI the server advertises for itself.
    pub locator_uri: String,
}
