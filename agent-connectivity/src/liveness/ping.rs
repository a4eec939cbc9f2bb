//! Periodic server ping and polling management.

use std::sync::Arc;
use std::time::Duration;

use agent_config::ConfigStore;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::ServerClock;
use crate::liveness::discovery::AutoDiscovery;
use crate::transport::CommandSender;
use crate::wire::PingRequest;

/// Number of pings allowed in flight at once.
pub const PING_POOL_SIZE: usize = 1;

/// What a single ping round did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingOutcome {
    /// Commands are not flowing; the sender was left polling for the server.
    NotSending,
    /// The server answered.
    Pinged,
    /// The ping failed; polling now watches for the server.
    Failed,
    /// Another ping was still running.
    Busy,
}

/// Pings the server on a fixed delay and keeps server polling in step.
pub struct PingExecutor {
    config: Arc<ConfigStore>,
    sender: Arc<dyn CommandSender>,
    discovery: Arc<AutoDiscovery>,
    clock: Arc<ServerClock>,
    interval: Duration,
    permits: Arc<Semaphore>,
}

impl PingExecutor {
    /// Creates an executor pinging every `interval`.
    #[must_use]
    pub fn new(
        config: Arc<ConfigStore>,
        sender: Arc<dyn CommandSender>,
        discovery: Arc<AutoDiscovery>,
        clock: Arc<ServerClock>,
        interval: Duration,
    ) -> Self {
        Self {
            config,
            sender,
            discovery,
            clock,
            interval,
            permits: Arc::new(Semaphore::new(PING_POOL_SIZE)),
        }
    }

    /// Delay between the end of one round and the start of the next.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Runs rounds until `cancel` fires, starting immediately.
    #[must_use]
    pub fn spawn(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let outcome = this.ping_once().await;
                debug!(?outcome, "ping round finished");
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    () = sleep(this.interval) => {}
                }
            }
            debug!("ping executor stopped");
        })
    }

    /// Runs one round.
    pub async fn ping_once(&self) -> PingOutcome {
        let Ok(_permit) = Arc::clone(&self.permits).try_acquire_owned() else {
            return PingOutcome::Busy;
        };

        if !self.sender.is_sending() {
            if !self.polling_covered() {
                info!("not sending commands; polling the server until it answers");
                self.sender.start_server_polling();
            }
            return PingOutcome::NotSending;
        }

        if self.sender.is_server_polling() {
            info!("server is reachable; polling stopped");
            self.sender.stop_server_polling();
        }

        let Some(connection) = self.sender.connection() else {
            debug!("no communicator to ping with");
            return PingOutcome::Failed;
        };
        let request = PingRequest {
            agent_name: self.config.agent_name(),
            update_availability: true,
            ack_requested: true,
        };
        match connection.ping(request).await {
            Ok(response) => {
                self.clock.observe(response.reply_server_timestamp);
                PingOutcome::Pinged
            }
            Err(err) => {
                if self.polling_covered() {
                    warn!(%err, "server ping failed");
                } else {
                    info!(%err, "server ping failed; polling the server until it answers");
                    self.sender.start_server_polling();
                }
                PingOutcome::Failed
            }
        }
    }

    fn polling_covered(&self) -> bool {
        self.sender.is_server_polling() || self.discovery.is_enabled()
    }
}

impl std::fmt::Debug for PingExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PingExecutor")
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}
