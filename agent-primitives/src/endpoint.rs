//! Candidate server entries advertised by the failover list.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result, Transport};

/// A server the agent may connect to.
///
/// Endpoints are immutable and compared structurally. The text form is
/// `address:port/secure_port`, which is also the line format of the persisted
/// failover list.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct ServerEndpoint {
    address: String,
    port: u16,
    secure_port: u16,
}

impl ServerEndpoint {
    /// Creates a new endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEndpoint`] when the address is blank.
    pub fn new(address: impl Into<String>, port: u16, secure_port: u16) -> Result<Self> {
        let address = address.into();
        if address.trim().is_empty() {
            return Err(Error::InvalidEndpoint {
                input: address,
                reason: "address cannot be empty".into(),
            });
        }
        Ok(Self {
            address,
            port,
            secure_port,
        })
    }

    /// Host name or IP address of the server.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Port used by plaintext transports.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Port used by secure transports.
    #[must_use]
    pub const fn secure_port(&self) -> u16 {
        self.secure_port
    }

    /// Returns the port to use for the given transport.
    #[must_use]
    pub const fn port_for(&self, transport: Transport) -> u16 {
        if transport.is_secure() {
            self.secure_port
        } else {
            self.port
        }
    }

    /// Returns `true` for `localhost`, `localhost.*` and `127.0.0.*` addresses.
    #[must_use]
    pub fn is_loopback(&self) -> bool {
        is_loopback_address(&self.address)
    }
}

pub(crate) fn is_loopback_address(address: &str) -> bool {
    address == "localhost" || address.starts_with("localhost.") || address.starts_with("127.0.0.")
}

impl Display for ServerEndpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.address, self.port, self.secure_port)
    }
}

impl FromStr for ServerEndpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidEndpoint {
            input: s.to_owned(),
            reason: reason.to_owned(),
        };

        let (host_port, secure) = s
            .trim()
            .rsplit_once('/')
            .ok_or_else(|| invalid("missing `/secure_port` suffix"))?;
        let (address, port) = host_port
            .rsplit_once(':')
            .ok_or_else(|| invalid("missing `:port`"))?;
        let port = port.parse().map_err(|_| invalid("port is not a number"))?;
        let secure_port = secure
            .parse()
            .map_err(|_| invalid("secure port is not a number"))?;

        Self::new(address, port, secure_port)
    }
}
