//! Strongly typed configuration schema.

use std::path::PathBuf;
use std::time::Duration;

use agent_primitives::{ServerLocator, Transport};
use serde::{Deserialize, Serialize};

use crate::{ConfigError, ConfigResult};

/// Lowest interval the ping executor will honour.
pub const MIN_SERVER_POLLING_INTERVAL: Duration = Duration::from_secs(60);

/// Every setting the connectivity runtime consults.
///
/// Unknown fields are ignored and missing fields take their defaults, so older
/// settings files keep loading after new options are added.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Name the agent registers under.
    pub agent_name: String,
    /// Address the agent's own command listener binds to.
    pub bind_address: String,
    /// Port the agent's own command listener binds to.
    pub bind_port: u16,
    /// Endpoint servers use to reach this agent; derived from the bind
    /// address and port when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_remote_endpoint: Option<ServerLocator>,
    /// Server the agent is currently configured to talk to.
    pub server: ServerLocator,
    /// Token granted by the server at registration time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_token: Option<String>,
    /// Directory holding the persisted failover list.
    pub data_directory: PathBuf,
    /// Register every time the sender first starts.
    pub register_with_server_at_startup: bool,
    /// Listen for server online/offline announcements.
    pub server_auto_detection: bool,
    /// Probe every failover list entry before accepting a registration.
    pub test_failover_list_at_startup: bool,
    /// Period of the primary server switchover check; zero disables it.
    pub primary_server_switchover_check_interval_msecs: u64,
    /// Period of the server ping.
    pub server_polling_interval_msecs: u64,
    /// How long startup waits for registration before moving on.
    pub wait_for_registration_msecs: u64,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            agent_name: "agent".into(),
            bind_address: "0.0.0.0".into(),
            bind_port: 16163,
            agent_remote_endpoint: None,
            server: default_server(),
            security_token: None,
            data_directory: PathBuf::from("data"),
            register_with_server_at_startup: true,
            server_auto_detection: false,
            test_failover_list_at_startup: false,
            primary_server_switchover_check_interval_msecs: 60 * 60 * 1000,
            server_polling_interval_msecs: 60 * 1000,
            wait_for_registration_msecs: 60 * 1000,
        }
    }
}

fn default_server() -> ServerLocator {
    ServerLocator::new(Transport::Socket, "127.0.0.1", 7080, "")
        .expect("default locator is valid")
}

impl AgentSettings {
    /// Switchover check period; `None` when the check is disabled.
    #[must_use]
    pub fn switchover_check_interval(&self) -> Option<Duration> {
        match self.primary_server_switchover_check_interval_msecs {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    /// Ping period, never shorter than [`MIN_SERVER_POLLING_INTERVAL`].
    #[must_use]
    pub fn server_polling_interval(&self) -> Duration {
        Duration::from_millis(self.server_polling_interval_msecs).max(MIN_SERVER_POLLING_INTERVAL)
    }

    /// Endpoint advertised to servers at registration.
    ///
    /// Falls back to the bind address and port over the server's transport;
    /// `None` only when neither is usable.
    #[must_use]
    pub fn agent_remote_endpoint(&self) -> Option<ServerLocator> {
        self.agent_remote_endpoint.clone().or_else(|| {
            ServerLocator::new(self.server.transport(), &self.bind_address, self.bind_port, "")
                .ok()
        })
    }

    /// How long startup blocks waiting for registration.
    #[must_use]
    pub const fn wait_for_registration(&self) -> Duration {
        Duration::from_millis(self.wait_for_registration_msecs)
    }

    /// Validates values that would otherwise fail later at runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a required field is blank.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.agent_name.trim().is_empty() {
            return Err(ConfigError::Invalid("agent name cannot be empty"));
        }
        if self.bind_address.trim().is_empty() {
            return Err(ConfigError::Invalid("bind address cannot be empty"));
        }
        if self.data_directory.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("data directory cannot be empty"));
        }
        Ok(())
    }
}
