//! Error taxonomy for transport calls and connectivity decisions.

use std::time::Duration;

use thiserror::Error;

/// Failures reported by the transport layer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommError {
    /// No connection could be established.
    #[error("cannot connect to {endpoint}: {reason}")]
    CannotConnect {
        /// Endpoint that was targeted.
        endpoint: String,
        /// Transport supplied context.
        reason: String,
    },
    /// An established connection dropped mid-request.
    #[error("connection to {endpoint} lost: {reason}")]
    ConnectionLost {
        /// Endpoint that was targeted.
        endpoint: String,
        /// Transport supplied context.
        reason: String,
    },
    /// The server refuses to talk to this agent build.
    #[error("agent version not supported by server: {0}")]
    NotSupported(String),
    /// The server actively refused the registration.
    #[error("registration rejected by server: {0}")]
    Rejected(String),
    /// The request did not complete in time.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    /// Any other failure reported by the remote side.
    #[error("remote failure: {0}")]
    Remote(String),
}

impl CommError {
    /// Convenience helper to construct connect failures.
    #[must_use]
    pub fn cannot_connect(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CannotConnect {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }

    /// Convenience helper to construct generic remote failures.
    #[must_use]
    pub fn remote(reason: impl Into<String>) -> Self {
        Self::Remote(reason.into())
    }
}

/// Result alias for transport calls.
pub type CommResult<T> = Result<T, CommError>;

/// Errors surfaced by the connectivity components.
#[derive(Debug, Error)]
pub enum ConnectivityError {
    /// A server switch could not be completed.
    #[error("switch to {target} failed: {reason}")]
    SwitchFailed {
        /// Locator that was targeted.
        target: String,
        /// Why the switch failed.
        reason: String,
    },
    /// The connect announcement lock could not be acquired in time.
    #[error("timed out after {0:?} waiting to send the connect announcement")]
    LockTimeout(Duration),
    /// The server requires a different agent build.
    #[error("agent version not supported by server: {0}")]
    VersionMismatch(String),
    /// Every entry in a freshly fetched failover list failed its probe.
    #[error("all {} failover list entries are unreachable: {}", .failed.len(), .failed.join(", "))]
    AllCandidatesUnreachable {
        /// Entries that failed, in list order.
        failed: Vec<String>,
    },
    /// An operator supplied switch target could not be parsed.
    #[error(transparent)]
    InvalidServer(#[from] agent_primitives::Error),
    /// No communicator is available to talk to the server.
    #[error("no remote communicator is available")]
    NoCommunicator,
    /// The runtime was started twice.
    #[error("connectivity runtime already started")]
    AlreadyStarted,
    /// Local file access failed.
    #[error("i/o error: {source}")]
    Io {
        /// Source [`std::io::Error`].
        #[from]
        source: std::io::Error,
    },
    /// Transport failure.
    #[error(transparent)]
    Comm(#[from] CommError),
}

/// Result alias for connectivity operations.
pub type ConnectivityResult<T> = Result<T, ConnectivityError>;
