//! Shared collaborators handed to every connectivity component.

use std::sync::Arc;

use agent_config::ConfigStore;

use crate::clock::ServerClock;
use crate::events::EventBus;
use crate::failover_list::SharedFailoverList;
use crate::hooks::{AgentUpdater, Console, ManualUpdater, StdConsole};
use crate::probe::{ReachabilityProbe, TcpProbe};
use crate::transport::{CommandSender, ConnectFailurePredicate, FailoverPredicate, ServerIdentifier};

/// Everything the connectivity components share.
///
/// Components take the narrow pieces they need from here at construction
/// time and never hold the context itself.
#[derive(Clone)]
pub struct ConnectivityContext {
    /// Durable agent configuration.
    pub config: Arc<ConfigStore>,
    /// Outbound command queue.
    pub sender: Arc<dyn CommandSender>,
    /// Direct "who are you" requests.
    pub identifier: Arc<dyn ServerIdentifier>,
    /// Failover list reachability checks.
    pub probe: Arc<dyn ReachabilityProbe>,
    /// Self-update hand-off.
    pub updater: Arc<dyn AgentUpdater>,
    /// Operator visible messages.
    pub console: Arc<dyn Console>,
    /// Classification of send failures.
    pub predicate: Arc<dyn FailoverPredicate>,
    /// Current failover list.
    pub failover_list: Arc<SharedFailoverList>,
    /// Agent/server clock difference.
    pub clock: Arc<ServerClock>,
    /// Connectivity event bus.
    pub events: EventBus,
}

impl ConnectivityContext {
    /// Starts a builder with the required collaborators.
    #[must_use]
    pub fn builder(
        config: Arc<ConfigStore>,
        sender: Arc<dyn CommandSender>,
        identifier: Arc<dyn ServerIdentifier>,
    ) -> ConnectivityContextBuilder {
        ConnectivityContextBuilder {
            config,
            sender,
            identifier,
            probe: None,
            updater: None,
            console: None,
            predicate: None,
            events: None,
        }
    }
}

impl std::fmt::Debug for ConnectivityContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectivityContext")
            .field("config", &self.config)
            .field("failover_list", &self.failover_list)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ConnectivityContext`].
pub struct ConnectivityContextBuilder {
    config: Arc<ConfigStore>,
    sender: Arc<dyn CommandSender>,
    identifier: Arc<dyn ServerIdentifier>,
    probe: Option<Arc<dyn ReachabilityProbe>>,
    updater: Option<Arc<dyn AgentUpdater>>,
    console: Option<Arc<dyn Console>>,
    predicate: Option<Arc<dyn FailoverPredicate>>,
    events: Option<EventBus>,
}

impl ConnectivityContextBuilder {
    /// Replaces the default [`TcpProbe`].
    #[must_use]
    pub fn probe(mut self, probe: Arc<dyn ReachabilityProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Replaces the default [`ManualUpdater`].
    #[must_use]
    pub fn updater(mut self, updater: Arc<dyn AgentUpdater>) -> Self {
        self.updater = Some(updater);
        self
    }

    /// Replaces the default [`StdConsole`].
    #[must_use]
    pub fn console(mut self, console: Arc<dyn Console>) -> Self {
        self.console = Some(console);
        self
    }

    /// Replaces the default [`ConnectFailurePredicate`].
    #[must_use]
    pub fn predicate(mut self, predicate: Arc<dyn FailoverPredicate>) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// Uses an existing event bus, e.g. one the transport layer already publishes to.
    #[must_use]
    pub fn events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Finalizes the context.
    #[must_use]
    pub fn build(self) -> ConnectivityContext {
        ConnectivityContext {
            config: self.config,
            sender: self.sender,
            identifier: self.identifier,
            probe: self.probe.unwrap_or_else(|| Arc::new(TcpProbe::default())),
            updater: self.updater.unwrap_or_else(|| Arc::new(ManualUpdater)),
            console: self.console.unwrap_or_else(|| Arc::new(StdConsole)),
            predicate: self.predicate.unwrap_or_else(|| Arc::new(ConnectFailurePredicate)),
            failover_list: Arc::new(SharedFailoverList::new()),
            clock: Arc::new(ServerClock::new()),
            events: self.events.unwrap_or_default(),
        }
    }
}
