//! Serialized server switching and cooldown-guarded failover.

use std::sync::Arc;
use std::time::Duration;

use agent_config::ConfigStore;
use agent_primitives::{ServerEndpoint, ServerLocator};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::announce::ConnectAnnouncer;
use crate::error::{ConnectivityError, ConnectivityResult};
use crate::events::{ConnectivityEvent, EventBus};
use crate::failover_list::SharedFailoverList;
use crate::liveness::discovery::AutoDiscovery;
use crate::transport::{CommandSender, ServerConnection};

/// Minimum spacing between two successful failovers.
pub const FAILOVER_COOLDOWN: Duration = Duration::from_secs(10);

#[derive(Debug, Default)]
struct FailoverState {
    last_failover: Option<Instant>,
}

/// Moves the agent between servers.
///
/// Every switch runs under one lock, so concurrent triggers are applied one
/// at a time; a failure-driven failover is ignored while the previous one is
/// younger than [`FAILOVER_COOLDOWN`].
pub struct ConnectionRegistry {
    config: Arc<ConfigStore>,
    sender: Arc<dyn CommandSender>,
    failover_list: Arc<SharedFailoverList>,
    discovery: Arc<AutoDiscovery>,
    announcer: Arc<ConnectAnnouncer>,
    events: EventBus,
    state: Mutex<FailoverState>,
    cooldown: Duration,
}

impl ConnectionRegistry {
    /// Creates a registry.
    #[must_use]
    pub fn new(
        config: Arc<ConfigStore>,
        sender: Arc<dyn CommandSender>,
        failover_list: Arc<SharedFailoverList>,
        discovery: Arc<AutoDiscovery>,
        announcer: Arc<ConnectAnnouncer>,
        events: EventBus,
    ) -> Self {
        Self {
            config,
            sender,
            failover_list,
            discovery,
            announcer,
            events,
            state: Mutex::new(FailoverState::default()),
            cooldown: FAILOVER_COOLDOWN,
        }
    }

    /// Switches to an operator supplied server.
    ///
    /// `target` is either a bare host name, which keeps the current transport,
    /// port, and parameters, or a full locator URI. On failure the previous
    /// server configuration is restored.
    pub async fn switch_to_server(&self, target: &str) -> bool {
        let original = self.config.server_locator();
        let locator = match ServerLocator::resolve(target, &original) {
            Ok(locator) => locator,
            Err(err) => {
                let err = ConnectivityError::from(err);
                warn!(requested = target, %err, "cannot switch to an invalid server");
                return false;
            }
        };
        let Some(connection) = self.sender.connection() else {
            let err = ConnectivityError::NoCommunicator;
            warn!(requested = target, %err, "cannot switch servers");
            return false;
        };
        let original_endpoint = connection.remote_endpoint();

        let _state = self.state.lock().await;
        if self.switch_to_locator(&connection, locator).await {
            return true;
        }

        self.config.set_server_locator(original.clone());
        if let Err(err) = connection.set_remote_endpoint(&original_endpoint) {
            warn!(endpoint = %original_endpoint, %err, "failed to restore the previous endpoint");
        }
        info!(server = %original, "restored previous server after failed switch");
        false
    }

    /// Moves to the next failover list entry unless a failover happened recently.
    ///
    /// Returns `true` when the agent now points at a new server.
    pub async fn failover_to_new_server(&self, connection: &Arc<dyn ServerConnection>) -> bool {
        let mut state = self.state.lock().await;
        if let Some(last) = state.last_failover {
            let elapsed = last.elapsed();
            if elapsed < self.cooldown {
                debug!(?elapsed, "failover requested during cooldown; ignoring");
                return false;
            }
        }

        let list = self.failover_list.current();
        let Some(next) = list.next() else {
            debug!("failover requested but the failover list is empty");
            return false;
        };
        let current = self.config.server_locator();
        let locator =
            ServerLocator::for_endpoint(&next, current.transport(), current.transport_params());

        if self.switch_to_locator(connection, locator).await {
            list.reset_index();
            state.last_failover = Some(Instant::now());
            true
        } else {
            false
        }
    }

    /// Switches to `primary`, keeping the current transport.
    ///
    /// Serialized with the other switch paths but not subject to the cooldown.
    pub async fn switch_to_primary(
        &self,
        connection: &Arc<dyn ServerConnection>,
        primary: &ServerEndpoint,
    ) -> bool {
        let mut state = self.state.lock().await;
        let current = self.config.server_locator();
        let locator =
            ServerLocator::for_endpoint(primary, current.transport(), current.transport_params());
        let switched = self.switch_to_locator(connection, locator).await;
        if switched {
            state.last_failover = Some(Instant::now());
        }
        switched
    }

    async fn switch_to_locator(
        &self,
        connection: &Arc<dyn ServerConnection>,
        locator: ServerLocator,
    ) -> bool {
        let target = locator.to_uri();
        self.discovery.unprepare();

        let switched = match self.apply_switch(connection.as_ref(), &locator).await {
            Ok(()) => {
                info!(server = %target, "now communicating with server");
                self.events.publish(ConnectivityEvent::SwitchedServer { locator });
                true
            }
            Err(err) => {
                let err = ConnectivityError::SwitchFailed {
                    target: target.clone(),
                    reason: err.to_string(),
                };
                warn!(%err, "server switch failed");
                self.events.publish(ConnectivityEvent::SwitchFailed { target });
                false
            }
        };

        if !self.discovery.prepare() {
            debug!("auto-discovery stays off after switch");
        }
        switched
    }

    async fn apply_switch(
        &self,
        connection: &dyn ServerConnection,
        locator: &ServerLocator,
    ) -> ConnectivityResult<()> {
        self.config.set_server_locator(locator.clone());
        connection.set_remote_endpoint(&locator.to_uri())?;
        self.announcer.announce(connection).await?;
        Ok(())
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("cooldown", &self.cooldown)
            .finish_non_exhaustive()
    }
}
