//! Connect announcements with duplicate suppression.

use std::sync::Arc;
use std::time::Duration;

use agent_config::ConfigStore;
use agent_primitives::AgentVersion;
use tokio::sync::RwLock;
use tokio::time::{Instant, timeout};
use tracing::{debug, error, info, warn};

use crate::clock::ServerClock;
use crate::error::{CommError, ConnectivityError, ConnectivityResult};
use crate::hooks::{AgentUpdater, Console};
use crate::transport::ServerConnection;
use crate::wire::ConnectAgentRequest;

/// How long a sender waits for the announcement lock.
pub const CONNECT_LOCK_TIMEOUT: Duration = Duration::from_secs(120);
/// Repeat announcements to the same endpoint inside this window are skipped.
pub const DUPLICATE_WINDOW: Duration = Duration::from_secs(30);

/// Most recent successful announcement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LastConnectNotification {
    /// When it was sent; `None` until one succeeds or after a failure.
    pub timestamp: Option<Instant>,
    /// Locator URI it was sent to.
    pub endpoint: String,
}

impl LastConnectNotification {
    fn covers(&self, endpoint: &str, window: Duration) -> bool {
        self.timestamp
            .is_some_and(|sent| self.endpoint == endpoint && sent.elapsed() < window)
    }
}

/// Result of an announcement request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Announcement {
    /// The server acknowledged the announcement.
    Sent,
    /// An announcement to the same endpoint went out moments ago.
    Skipped,
}

/// Sends "I am about to talk to you" to the server before commands flow.
pub struct ConnectAnnouncer {
    config: Arc<ConfigStore>,
    clock: Arc<ServerClock>,
    updater: Arc<dyn AgentUpdater>,
    console: Arc<dyn Console>,
    last: RwLock<LastConnectNotification>,
    lock_timeout: Duration,
    window: Duration,
}

impl ConnectAnnouncer {
    /// Creates an announcer with the default lock timeout and duplicate window.
    #[must_use]
    pub fn new(
        config: Arc<ConfigStore>,
        clock: Arc<ServerClock>,
        updater: Arc<dyn AgentUpdater>,
        console: Arc<dyn Console>,
    ) -> Self {
        Self {
            config,
            clock,
            updater,
            console,
            last: RwLock::new(LastConnectNotification::default()),
            lock_timeout: CONNECT_LOCK_TIMEOUT,
            window: DUPLICATE_WINDOW,
        }
    }

    /// Announces the agent to whatever server `connection` targets.
    ///
    /// # Errors
    ///
    /// * [`ConnectivityError::LockTimeout`] when another announcement holds the
    ///   lock for longer than the lock timeout.
    /// * [`ConnectivityError::VersionMismatch`] when the server rejects this
    ///   agent build; an agent update has been requested by then.
    /// * [`ConnectivityError::Comm`] for any other transport failure.
    pub async fn announce(
        &self,
        connection: &dyn ServerConnection,
    ) -> ConnectivityResult<Announcement> {
        let mut last = timeout(self.lock_timeout, self.last.write())
            .await
            .map_err(|_| ConnectivityError::LockTimeout(self.lock_timeout))?;

        let endpoint = connection.remote_endpoint();
        if last.covers(&endpoint, self.window) {
            info!(%endpoint, "connect announcement sent moments ago; skipping");
            return Ok(Announcement::Skipped);
        }

        let request = ConnectAgentRequest {
            agent_name: self.config.agent_name(),
            agent_version: AgentVersion::current(),
        };
        match connection.connect_agent(request).await {
            Ok(results) => {
                last.timestamp = Some(Instant::now());
                last.endpoint.clone_from(&endpoint);
                drop(last);

                self.clock.observe(results.server_time);
                if results.is_down {
                    warn!(%endpoint, "server had this agent marked as down; bringing it back up");
                }
                debug!(%endpoint, "connect announcement acknowledged");
                Ok(Announcement::Sent)
            }
            Err(CommError::NotSupported(reason)) => {
                last.timestamp = None;
                drop(last);

                error!(%endpoint, %reason, "server does not support this agent version; updating");
                self.console.message(&format!(
                    "The server at {endpoint} does not support this agent version ({}). \
                     The agent will attempt to update itself.",
                    AgentVersion::current()
                ));
                self.updater.update_agent_now().await;
                Err(ConnectivityError::VersionMismatch(reason))
            }
            Err(err) => {
                last.timestamp = None;
                debug!(%endpoint, %err, "connect announcement failed");
                Err(err.into())
            }
        }
    }

    /// Copy of the most recent successful announcement.
    pub async fn last_notification(&self) -> LastConnectNotification {
        self.last.read().await.clone()
    }
}

impl std::fmt::Debug for ConnectAnnouncer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectAnnouncer")
            .field("lock_timeout", &self.lock_timeout)
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}
