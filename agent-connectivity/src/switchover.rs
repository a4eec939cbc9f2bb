//! Periodic return to the primary server.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use agent_config::ConfigStore;
use agent_primitives::ServerLocator;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::events::{ConnectivityEvent, EventBus};
use crate::failover_list::{FailoverList, SharedFailoverList};
use crate::registry::ConnectionRegistry;
use crate::store::FailoverListStore;
use crate::transport::{CommandSender, ServerIdentifier};

/// Phases of the switchover worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchoverPhase {
    /// Constructed, worker not started.
    Idle,
    /// Waiting for the next period or an explicit check request.
    Sleeping,
    /// Running a check.
    Checking,
    /// Worker stopped; no further checks run.
    Stopped,
}

/// Inputs that move the worker between phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchoverSignal {
    /// Worker task spawned.
    Start,
    /// Period elapsed or a check was requested.
    Wake,
    /// Check finished.
    Finish,
    /// Shutdown requested.
    Stop,
}

impl SwitchoverPhase {
    /// Phase reached by applying `signal`, or `None` when it does not apply.
    #[must_use]
    pub const fn transition(self, signal: SwitchoverSignal) -> Option<Self> {
        match (self, signal) {
            (Self::Idle, SwitchoverSignal::Start) | (Self::Checking, SwitchoverSignal::Finish) => {
                Some(Self::Sleeping)
            }
            (Self::Sleeping, SwitchoverSignal::Wake) => Some(Self::Checking),
            (_, SwitchoverSignal::Stop) => Some(Self::Stopped),
            _ => None,
        }
    }
}

/// What a single check concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Commands are not flowing; nothing was checked.
    NotSending,
    /// The list could not be refreshed from the server.
    FetchFailed,
    /// The server has no failover list for this agent.
    NoList,
    /// The agent already talks to the primary.
    AlreadyOnPrimary,
    /// The primary did not answer the identification probe.
    PrimaryUnreachable,
    /// The agent moved to the primary.
    Switched,
    /// The primary answered the probe but the switch did not complete.
    SwitchFailed,
}

/// Periodically refreshes the failover list and moves back to its head.
pub struct SwitchoverController {
    config: Arc<ConfigStore>,
    sender: Arc<dyn CommandSender>,
    identifier: Arc<dyn ServerIdentifier>,
    failover_list: Arc<SharedFailoverList>,
    store: Arc<FailoverListStore>,
    registry: Arc<ConnectionRegistry>,
    events: EventBus,
    interval: Option<Duration>,
    wake: Notify,
    phase: Mutex<SwitchoverPhase>,
    cancel: CancellationToken,
}

impl SwitchoverController {
    /// Creates a controller; `interval` of `None` disables the periodic check.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        config: Arc<ConfigStore>,
        sender: Arc<dyn CommandSender>,
        identifier: Arc<dyn ServerIdentifier>,
        failover_list: Arc<SharedFailoverList>,
        store: Arc<FailoverListStore>,
        registry: Arc<ConnectionRegistry>,
        events: EventBus,
        interval: Option<Duration>,
    ) -> Self {
        Self {
            config,
            sender,
            identifier,
            failover_list,
            store,
            registry,
            events,
            interval,
            wake: Notify::new(),
            phase: Mutex::new(SwitchoverPhase::Idle),
            cancel: CancellationToken::new(),
        }
    }

    /// Current worker phase.
    #[must_use]
    pub fn phase(&self) -> SwitchoverPhase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawns the worker; returns `None` when the check is disabled or the
    /// worker already ran.
    pub fn start(self: &Arc<Self>, parent: &CancellationToken) -> Option<JoinHandle<()>> {
        let Some(interval) = self.interval else {
            info!("primary server switchover check disabled");
            return None;
        };
        if !self.advance(SwitchoverSignal::Start) {
            return None;
        }

        let this = Arc::clone(self);
        let parent = parent.clone();
        Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = this.cancel.cancelled() => break,
                    () = parent.cancelled() => break,
                    () = this.wake.notified() => {}
                    () = sleep(interval) => {}
                }
                this.advance(SwitchoverSignal::Wake);
                let outcome = this.check_primary().await;
                debug!(?outcome, "primary server switchover check finished");
                this.advance(SwitchoverSignal::Finish);
            }
            this.advance(SwitchoverSignal::Stop);
            debug!("switchover worker stopped");
        }))
    }

    /// Requests an immediate check from the worker.
    pub fn check_now(&self) {
        self.wake.notify_one();
    }

    /// Stops the worker.
    pub fn stop(&self) {
        self.cancel.cancel();
        self.advance(SwitchoverSignal::Stop);
    }

    /// Refreshes the failover list and moves to its head when that is reachable.
    pub async fn check_primary(&self) -> CheckOutcome {
        if !self.sender.is_sending() {
            return CheckOutcome::NotSending;
        }
        let Some(connection) = self.sender.connection() else {
            return CheckOutcome::NotSending;
        };

        let fetched = match connection.get_failover_list(&self.config.agent_name()).await {
            Ok(fetched) => fetched,
            Err(err) => {
                debug!(%err, "could not refresh the failover list");
                return CheckOutcome::FetchFailed;
            }
        };
        let current_list = self.failover_list.current();
        let list = match fetched {
            Some(servers) if current_list.servers() == servers.as_slice() => {
                debug!(size = servers.len(), "failover list unchanged");
                current_list
            }
            Some(servers) => {
                let list = FailoverList::new(servers);
                self.store.persist(Some(&list));
                let list = self.failover_list.replace(list);
                self.events
                    .publish(ConnectivityEvent::FailoverListUpdated { size: list.size() });
                list
            }
            None => {
                self.store.persist(None);
                let list = self.failover_list.replace(FailoverList::empty());
                self.events.publish(ConnectivityEvent::FailoverListUpdated { size: 0 });
                list
            }
        };

        let Some(primary) = list.get(0).cloned() else {
            return CheckOutcome::NoList;
        };
        let current = self.config.server_locator();
        if current.targets(&primary) {
            if list.index() == 0 {
                let _ = list.next();
            }
            debug!(primary = %primary, "already connected to the primary server");
            return CheckOutcome::AlreadyOnPrimary;
        }

        let target =
            ServerLocator::for_endpoint(&primary, current.transport(), current.transport_params());
        if let Err(err) = self.identifier.identify(&target).await {
            debug!(primary = %primary, %err, "primary server is not answering; staying put");
            return CheckOutcome::PrimaryUnreachable;
        }

        info!(primary = %primary, current = %current, "primary server is back; switching to it");
        if self.registry.switch_to_primary(&connection, &primary).await {
            list.reset_index();
            CheckOutcome::Switched
        } else {
            CheckOutcome::SwitchFailed
        }
    }

    fn advance(&self, signal: SwitchoverSignal) -> bool {
        let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
        match phase.transition(signal) {
            Some(next) => {
                if next != *phase {
                    debug!(from = ?*phase, to = ?next, ?signal, "switchover phase transition");
                    *phase = next;
                }
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for SwitchoverController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwitchoverController")
            .field("interval", &self.interval)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}
