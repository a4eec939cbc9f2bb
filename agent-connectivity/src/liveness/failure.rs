//! Failover driven by send failures and by connect-time announcement errors.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::announce::{Announcement, ConnectAnnouncer};
use crate::error::{CommError, ConnectivityError, ConnectivityResult};
use crate::failover_list::SharedFailoverList;
use crate::registry::ConnectionRegistry;
use crate::transport::{Command, FailoverPredicate, ServerConnection};

/// Command config key holding the per-command failover attempt count.
pub const FAILOVER_ATTEMPTS_KEY: &str = "failover-attempts";

/// What the sender should do with a command whose delivery failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDecision {
    /// Resend the command, now aimed at whichever server the agent points at.
    Retry,
    /// Report the failure to the caller.
    GiveUp,
}

/// Invoked by the sender whenever a command could not be delivered.
#[async_trait]
pub trait SendFailureCallback: Send + Sync {
    /// Decides whether `command` should be retried after `error`.
    async fn failure_detected(
        &self,
        connection: &Arc<dyn ServerConnection>,
        command: &mut Command,
        error: &CommError,
    ) -> FailureDecision;
}

/// Fails over on connectivity errors and retries each command at most once
/// per failover list entry.
pub struct FailoverFailureCallback {
    registry: Arc<ConnectionRegistry>,
    failover_list: Arc<SharedFailoverList>,
    predicate: Arc<dyn FailoverPredicate>,
}

impl FailoverFailureCallback {
    /// Creates the callback.
    #[must_use]
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        failover_list: Arc<SharedFailoverList>,
        predicate: Arc<dyn FailoverPredicate>,
    ) -> Self {
        Self {
            registry,
            failover_list,
            predicate,
        }
    }
}

#[async_trait]
impl SendFailureCallback for FailoverFailureCallback {
    async fn failure_detected(
        &self,
        connection: &Arc<dyn ServerConnection>,
        command: &mut Command,
        error: &CommError,
    ) -> FailureDecision {
        if !self.predicate.is_failover_worthy(error) {
            return FailureDecision::GiveUp;
        }

        let size = self.failover_list.current().size();
        let attempts = command
            .config(FAILOVER_ATTEMPTS_KEY)
            .and_then(|value| value.parse::<usize>().ok())
            .unwrap_or(0);
        if attempts >= size {
            command.remove_config(FAILOVER_ATTEMPTS_KEY);
            let command = command.name();
            debug!(command, attempts, "command failed on every failover server; giving up");
            return FailureDecision::GiveUp;
        }

        let attempt = attempts + 1;
        command.set_config(FAILOVER_ATTEMPTS_KEY, attempt.to_string());
        info!(command = command.name(), attempt, %error, "send failed; failing over and retrying");
        self.registry.failover_to_new_server(connection).await;
        FailureDecision::Retry
    }
}

impl std::fmt::Debug for FailoverFailureCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailoverFailureCallback").finish_non_exhaustive()
    }
}

/// Sends the connect announcement when the communicator first connects.
pub struct ConnectInitializer {
    announcer: Arc<ConnectAnnouncer>,
    registry: Arc<ConnectionRegistry>,
    predicate: Arc<dyn FailoverPredicate>,
}

impl ConnectInitializer {
    /// Creates the initializer.
    #[must_use]
    pub fn new(
        announcer: Arc<ConnectAnnouncer>,
        registry: Arc<ConnectionRegistry>,
        predicate: Arc<dyn FailoverPredicate>,
    ) -> Self {
        Self {
            announcer,
            registry,
            predicate,
        }
    }

    /// Announces the agent, failing over when the server is unreachable.
    ///
    /// # Errors
    ///
    /// Propagates the announcement error; a failover has already been
    /// attempted when that error was failover worthy.
    pub async fn initialize(
        &self,
        connection: &Arc<dyn ServerConnection>,
    ) -> ConnectivityResult<Announcement> {
        match self.announcer.announce(connection.as_ref()).await {
            Err(ConnectivityError::Comm(err)) if self.predicate.is_failover_worthy(&err) => {
                info!(%err, "connect announcement failed; failing over");
                self.registry.failover_to_new_server(connection).await;
                Err(ConnectivityError::Comm(err))
            }
            other => other,
        }
    }
}

impl std::fmt::Debug for ConnectInitializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectInitializer").finish_non_exhaustive()
    }
}
