//! Reachability probing of failover candidates.

use std::time::Duration;

use agent_primitives::ServerEndpoint;
use async_trait::async_trait;
use futures::future::join_all;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Default connect timeout applied per port.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Checks whether a server entry accepts connections.
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    /// Returns `true` when the server answers on either of its ports.
    async fn is_reachable(&self, endpoint: &ServerEndpoint) -> bool;
}

/// Probes by opening a TCP connection to the plain port, then the secure port.
#[derive(Debug, Clone, Copy)]
pub struct TcpProbe {
    connect_timeout: Duration,
}

impl TcpProbe {
    /// Creates a probe with a custom per-port connect timeout.
    #[must_use]
    pub const fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    async fn try_port(&self, address: &str, port: u16) -> bool {
        match timeout(self.connect_timeout, TcpStream::connect((address, port))).await {
            Ok(Ok(_)) => true,
            Ok(Err(err)) => {
                debug!(address, port, %err, "probe connect failed");
                false
            }
            Err(_) => {
                debug!(address, port, "probe connect timed out");
                false
            }
        }
    }
}

impl Default for TcpProbe {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_TIMEOUT)
    }
}

#[async_trait]
impl ReachabilityProbe for TcpProbe {
    async fn is_reachable(&self, endpoint: &ServerEndpoint) -> bool {
        self.try_port(endpoint.address(), endpoint.port()).await
            || self.try_port(endpoint.address(), endpoint.secure_port()).await
    }
}

/// Probes every entry concurrently and returns the ones that did not answer,
/// in list order.
pub async fn unreachable_servers(
    probe: &dyn ReachabilityProbe,
    servers: &[ServerEndpoint],
) -> Vec<ServerEndpoint> {
    let results = join_all(servers.iter().map(|server| probe.is_reachable(server))).await;
    servers
        .iter()
        .zip(results)
        .filter_map(|(server, reachable)| {
            if reachable {
                debug!(server = %server, "failover candidate is reachable");
                None
            } else {
                warn!(server = %server, "failover candidate is unreachable");
                Some(server.clone())
            }
        })
        .collect()
}
