//! Broadcast bus for connectivity state changes.

use agent_primitives::ServerLocator;
use tokio::sync::broadcast;
use tracing::trace;

const DEFAULT_CAPACITY: usize = 64;

/// State changes observed by or produced by the connectivity runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectivityEvent {
    /// The command sender began delivering commands.
    SenderStarted,
    /// The command sender stopped delivering commands.
    SenderStopped,
    /// A server announced that it came online.
    ServerOnline {
        /// Locator URI advertised by the server.
        locator_uri: String,
    },
    /// A server announced that it is going offline.
    ServerOffline {
        /// Locator URI advertised by the server.
        locator_uri: String,
    },
    /// Registration completed and a token was stored.
    Registered,
    /// The agent now points at a different server.
    SwitchedServer {
        /// Server now in use.
        locator: ServerLocator,
    },
    /// A switch attempt did not complete.
    SwitchFailed {
        /// Locator URI that was targeted.
        target: String,
    },
    /// A new failover list replaced the previous one.
    FailoverListUpdated {
        /// Number of entries in the new list.
        size: usize,
    },
}

/// Cloneable publisher handle; every clone feeds the same subscribers.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ConnectivityEvent>,
}

impl EventBus {
    /// Creates a bus that buffers up to `capacity` events per slow subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event; it is dropped silently when nobody listens.
    pub fn publish(&self, event: ConnectivityEvent) {
        if self.sender.send(event).is_err() {
            trace!("connectivity event published without subscribers");
        }
    }

    /// Subscribes to events published after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectivityEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
