//! Agent registration with retry, token rotation, and failover list commit.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use agent_config::ConfigStore;
use agent_primitives::{AgentVersion, ServerEndpoint};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{CommError, ConnectivityError};
use crate::events::{ConnectivityEvent, EventBus};
use crate::failover_list::{FailoverList, SharedFailoverList};
use crate::hooks::{AgentUpdater, Console};
use crate::probe::{ReachabilityProbe, unreachable_servers};
use crate::registry::ConnectionRegistry;
use crate::store::FailoverListStore;
use crate::transport::{CommandSender, ServerConnection};
use crate::wire::{RegistrationRequest, RegistrationResults};

/// Retry timing for the registration loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationConfig {
    /// First delay after a generic failure; doubles on every further failure.
    pub initial_retry_delay: Duration,
    /// Upper bound for the doubling delay.
    pub max_retry_delay: Duration,
    /// Fixed delay after a rejection or an all-unreachable failover list.
    pub fixed_retry_delay: Duration,
    /// Rejections tolerated before the loop gives up.
    pub max_rejections: NonZeroUsize,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            initial_retry_delay: Duration::from_secs(1),
            max_retry_delay: Duration::from_secs(60),
            fixed_retry_delay: Duration::from_secs(30),
            max_rejections: NonZeroUsize::new(5).expect("non-zero"),
        }
    }
}

/// How a registration run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationOutcome {
    /// A token is stored and the failover list is committed.
    Registered,
    /// A newer run or shutdown cancelled this one.
    Cancelled,
    /// No communicator was available.
    NoCommunicator,
    /// The server does not accept this agent version; an update was requested.
    VersionMismatch,
    /// The server kept rejecting the agent.
    Rejected,
}

enum AttemptError {
    Comm(CommError),
    AllUnreachable(Vec<ServerEndpoint>),
}

impl From<CommError> for AttemptError {
    fn from(err: CommError) -> Self {
        Self::Comm(err)
    }
}

/// Registers the agent with its server, one run at a time.
///
/// Starting a run cancels the previous one. Runs share a handshake lock
/// around "clear token, register, store token", so a cancelled run can never
/// overwrite the token of its successor.
pub struct RegistrationCoordinator {
    config: Arc<ConfigStore>,
    sender: Arc<dyn CommandSender>,
    failover_list: Arc<SharedFailoverList>,
    store: Arc<FailoverListStore>,
    registry: Arc<ConnectionRegistry>,
    probe: Arc<dyn ReachabilityProbe>,
    updater: Arc<dyn AgentUpdater>,
    console: Arc<dyn Console>,
    events: EventBus,
    timing: RegistrationConfig,
    shutdown: CancellationToken,
    active: Mutex<Option<CancellationToken>>,
    handshake: tokio::sync::Mutex<()>,
    results: RwLock<Option<RegistrationResults>>,
    loopback_warned: AtomicBool,
}

impl RegistrationCoordinator {
    /// Creates a coordinator whose runs all end when `shutdown` fires.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        config: Arc<ConfigStore>,
        sender: Arc<dyn CommandSender>,
        failover_list: Arc<SharedFailoverList>,
        store: Arc<FailoverListStore>,
        registry: Arc<ConnectionRegistry>,
        probe: Arc<dyn ReachabilityProbe>,
        updater: Arc<dyn AgentUpdater>,
        console: Arc<dyn Console>,
        events: EventBus,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            sender,
            failover_list,
            store,
            registry,
            probe,
            updater,
            console,
            events,
            timing: RegistrationConfig::default(),
            shutdown,
            active: Mutex::new(None),
            handshake: tokio::sync::Mutex::new(()),
            results: RwLock::new(None),
            loopback_warned: AtomicBool::new(false),
        }
    }

    /// Overrides the retry timing.
    #[must_use]
    pub fn with_timing(mut self, timing: RegistrationConfig) -> Self {
        self.timing = timing;
        self
    }

    /// Returns `true` when a security token is held.
    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.config.security_token().is_some()
    }

    /// Results of the last successful registration in this process.
    #[must_use]
    pub fn last_results(&self) -> Option<RegistrationResults> {
        self.results.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Starts a registration run, cancelling any run already in progress.
    ///
    /// Waits up to `max_wait` for the run to finish and returns its outcome;
    /// `None` means the run is still going in the background. A zero
    /// `max_wait` returns immediately.
    pub async fn register_with_server(
        self: &Arc<Self>,
        max_wait: Duration,
        regenerate_token: bool,
    ) -> Option<RegistrationOutcome> {
        let cancel = self.shutdown.child_token();
        let previous = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(cancel.clone());
        if let Some(previous) = previous {
            debug!("cancelling the registration run already in progress");
            previous.cancel();
        }

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.run(cancel, regenerate_token).await });
        if max_wait.is_zero() {
            return None;
        }
        match timeout(max_wait, handle).await {
            Ok(Ok(outcome)) => Some(outcome),
            Ok(Err(err)) => {
                warn!(%err, "registration task failed");
                None
            }
            Err(_) => {
                info!(?max_wait, "registration still in progress; continuing without waiting");
                None
            }
        }
    }

    async fn run(&self, cancel: CancellationToken, regenerate_token: bool) -> RegistrationOutcome {
        let mut delay: Option<Duration> = None;
        let mut backoff = self.timing.initial_retry_delay;
        let mut rejections = 0usize;
        let mut unreachable_warned = false;

        // The first attempt goes out immediately; only retries wait.
        loop {
            if let Some(delay) = delay.take() {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return RegistrationOutcome::Cancelled,
                    () = sleep(delay) => {}
                }
            }
            if cancel.is_cancelled() {
                return RegistrationOutcome::Cancelled;
            }

            let Some(connection) = self.sender.connection() else {
                warn!("cannot register: {}", ConnectivityError::NoCommunicator);
                return RegistrationOutcome::NoCommunicator;
            };
            if !self.sender.is_sending() {
                debug!(?backoff, "command sender not running yet; waiting before registering");
                delay = Some(backoff);
                continue;
            }

            let results = match self.attempt(connection.as_ref(), &cancel, regenerate_token).await {
                Ok(Some(results)) => results,
                Ok(None) => return RegistrationOutcome::Cancelled,
                Err(AttemptError::AllUnreachable(failed)) => {
                    let err = ConnectivityError::AllCandidatesUnreachable {
                        failed: failed.iter().map(ToString::to_string).collect(),
                    };
                    if unreachable_warned {
                        debug!(%err, "registration retry");
                    } else {
                        unreachable_warned = true;
                        warn!(%err, "no failover list server is reachable; retrying registration");
                        self.console.message(&format!(
                            "WARNING: {err}. \
                             Check that the agent can reach the servers' advertised addresses."
                        ));
                    }
                    delay = Some(self.timing.fixed_retry_delay);
                    continue;
                }
                Err(AttemptError::Comm(CommError::NotSupported(reason))) => {
                    error!(%reason, "server does not support this agent version; updating");
                    self.console.message(&format!(
                        "The server does not support this agent version ({}). \
                         The agent will attempt to update itself.",
                        AgentVersion::current()
                    ));
                    self.updater.update_agent_now().await;
                    return RegistrationOutcome::VersionMismatch;
                }
                Err(AttemptError::Comm(CommError::Rejected(reason))) => {
                    rejections += 1;
                    error!(%reason, rejections, "server rejected the registration");
                    if rejections >= self.timing.max_rejections.get() {
                        self.console.message(&format!(
                            "The server rejected the agent registration {rejections} times \
                             ({reason}); giving up."
                        ));
                        return RegistrationOutcome::Rejected;
                    }
                    self.console.message(&format!(
                        "The server rejected the agent registration ({reason}); retrying in {:?}.",
                        self.timing.fixed_retry_delay
                    ));
                    delay = Some(self.timing.fixed_retry_delay);
                    continue;
                }
                Err(AttemptError::Comm(err)) => {
                    warn!(%err, retry_in = ?backoff, "registration failed; will retry");
                    delay = Some(backoff);
                    backoff = (backoff * 2).min(self.timing.max_retry_delay);
                    continue;
                }
            };

            self.commit(&connection, results).await;
            return RegistrationOutcome::Registered;
        }
    }

    /// One register round trip under the handshake lock.
    ///
    /// `Ok(None)` means the run was cancelled; the prior token is back in place.
    async fn attempt(
        &self,
        connection: &dyn ServerConnection,
        cancel: &CancellationToken,
        regenerate_token: bool,
    ) -> Result<Option<RegistrationResults>, AttemptError> {
        let _handshake = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(None),
            guard = self.handshake.lock() => guard,
        };
        if cancel.is_cancelled() {
            return Ok(None);
        }

        let settings = self.config.snapshot();
        let remote_endpoint = settings.agent_remote_endpoint();
        let loopback = remote_endpoint.as_ref().filter(|endpoint| endpoint.is_loopback());
        if let Some(endpoint) = loopback {
            if !self.loopback_warned.swap(true, Ordering::AcqRel) {
                warn!(
                    %endpoint,
                    "agent advertises a loopback endpoint; other servers cannot reach it"
                );
                self.console.message(&format!(
                    "WARNING: the agent is advertising {endpoint}, a loopback address."
                ));
            }
        }

        let previous = settings.security_token.clone();
        let request = RegistrationRequest {
            agent_name: settings.agent_name.clone(),
            address: settings.bind_address.clone(),
            port: settings.bind_port,
            remote_endpoint: remote_endpoint.map(|endpoint| endpoint.to_uri()).unwrap_or_default(),
            regenerate_token,
            original_token: previous.clone(),
            agent_version: AgentVersion::current(),
        };

        self.install_token(connection, None);
        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            response = connection.register_agent(request) => Some(response),
        };
        let results = match response {
            None => {
                debug!("registration cancelled mid-request; restoring the previous token");
                self.install_token(connection, previous);
                return Ok(None);
            }
            Some(Err(err)) => {
                self.install_token(connection, previous);
                return Err(err.into());
            }
            Some(Ok(results)) => results,
        };

        if settings.test_failover_list_at_startup {
            let servers = results.failover_list.as_deref().unwrap_or_default();
            if !servers.is_empty() {
                let failed = tokio::select! {
                    biased;
                    () = cancel.cancelled() => None,
                    failed = unreachable_servers(self.probe.as_ref(), servers) => Some(failed),
                };
                let Some(failed) = failed else {
                    self.install_token(connection, previous);
                    return Ok(None);
                };
                if failed.len() == servers.len() {
                    self.install_token(connection, previous);
                    return Err(AttemptError::AllUnreachable(failed));
                }
                if !failed.is_empty() {
                    warn!(
                        unreachable = failed.len(),
                        total = servers.len(),
                        "some failover servers are unreachable; continuing with registration"
                    );
                }
            }
        } else {
            debug!("failover list reachability test disabled");
        }

        self.install_token(connection, Some(results.agent_token.clone()));
        info!(agent = %settings.agent_name, "agent registered with server");
        Ok(Some(results))
    }

    fn install_token(&self, connection: &dyn ServerConnection, token: Option<String>) {
        self.config.set_security_token(token.clone());
        connection.set_security_token(token);
    }

    /// Stores the results and aligns the agent with the new failover list.
    async fn commit(&self, connection: &Arc<dyn ServerConnection>, results: RegistrationResults) {
        let list = match &results.failover_list {
            Some(servers) => {
                let list = FailoverList::new(servers.clone());
                self.store.persist(Some(&list));
                list
            }
            None => {
                self.store.persist(None);
                FailoverList::empty()
            }
        };
        *self.results.write().unwrap_or_else(PoisonError::into_inner) = Some(results);
        let list = self.failover_list.replace(list);
        self.events.publish(ConnectivityEvent::FailoverListUpdated { size: list.size() });
        self.events.publish(ConnectivityEvent::Registered);

        let Some(primary) = list.peek().cloned() else {
            return;
        };
        if self.config.server_locator().targets(&primary) {
            let _ = list.next();
            debug!(primary = %primary, "already pointed at the primary server");
        } else if !self.registry.failover_to_new_server(connection).await {
            warn!(primary = %primary, "registered, but could not move to the primary server");
        }
    }
}

impl std::fmt::Debug for RegistrationCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationCoordinator")
            .field("timing", &self.timing)
            .finish_non_exhaustive()
    }
}
