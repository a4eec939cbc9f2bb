//! Server connectivity and failover for the fleet agent.
//!
//! The crate keeps an agent attached to one server of a cluster: it registers
//! the agent and stores its token, tracks the server supplied failover list,
//! fails over when commands cannot be delivered, returns to the primary server
//! once it is back, and reacts to server online/offline announcements. The
//! transport itself stays behind the traits in [`transport`].

#![warn(missing_docs, clippy::pedantic)]

mod announce;
mod clock;
mod context;
mod error;
mod events;
mod failover_list;
mod hooks;
pub mod liveness;
mod probe;
mod registration;
mod registry;
mod runtime;
mod store;
mod switchover;
pub mod transport;
pub mod wire;

pub use announce::{
    Announcement, CONNECT_LOCK_TIMEOUT, ConnectAnnouncer, DUPLICATE_WINDOW, LastConnectNotification,
};
pub use clock::{MAX_CLOCK_DIFFERENCE, ServerClock};
pub use context::{ConnectivityContext, ConnectivityContextBuilder};
pub use error::{CommError, CommResult, ConnectivityError, ConnectivityResult};
pub use events::{ConnectivityEvent, EventBus};
pub use failover_list::{FailoverList, SharedFailoverList};
pub use hooks::{AgentUpdater, CollectingConsole, Console, ManualUpdater, StdConsole};
pub use liveness::discovery::{AutoDiscovery, AutoDiscoveryListener};
pub use liveness::failure::{
    ConnectInitializer, FAILOVER_ATTEMPTS_KEY, FailoverFailureCallback, FailureDecision,
    SendFailureCallback,
};
pub use liveness::ping::{PING_POOL_SIZE, PingExecutor, PingOutcome};
pub use probe::{DEFAULT_PROBE_TIMEOUT, ReachabilityProbe, TcpProbe, unreachable_servers};
pub use registration::{RegistrationConfig, RegistrationCoordinator, RegistrationOutcome};
pub use registry::{ConnectionRegistry, FAILOVER_COOLDOWN};
pub use runtime::AgentRuntime;
pub use store::{FAILOVER_LIST_FILE, FailoverListStore};
pub use switchover::{CheckOutcome, SwitchoverController, SwitchoverPhase, SwitchoverSignal};
pub use transport::{
    Command, CommandSender, ConnectFailurePredicate, FailoverPredicate, ServerConnection,
    ServerIdentifier,
};
