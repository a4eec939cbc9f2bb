//! Full server locator: transport, address, port and transport parameters.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result, ServerEndpoint, Transport};

/// Where the agent sends its commands.
///
/// Rendered as `transport://address:port/params`; the parameter segment may be
/// empty.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServerLocator {
    transport: Transport,
    address: String,
    port: u16,
    transport_params: String,
}

impl ServerLocator {
    /// Creates a locator from its parts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidLocator`] when the address is blank.
    pub fn new(
        transport: Transport,
        address: impl Into<String>,
        port: u16,
        transport_params: impl Into<String>,
    ) -> Result<Self> {
        let address = address.into();
        if address.trim().is_empty() {
            return Err(Error::InvalidLocator {
                uri: String::new(),
                reason: "address cannot be empty".into(),
            });
        }
        Ok(Self {
            transport,
            address,
            port,
            transport_params: transport_params.into(),
        })
    }

    /// Builds the locator that targets `endpoint` over `transport`.
    #[must_use]
    pub fn for_endpoint(
        endpoint: &ServerEndpoint,
        transport: Transport,
        transport_params: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            address: endpoint.address().to_owned(),
            port: endpoint.port_for(transport),
            transport_params: transport_params.into(),
        }
    }

    /// Interprets an operator supplied switch target.
    ///
    /// A bare host name keeps the transport, port and parameters of `current`;
    /// anything containing `://` is parsed as a full locator URI.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidLocator`] when the target cannot be parsed.
    pub fn resolve(target: &str, current: &Self) -> Result<Self> {
        let target = target.trim();
        if target.contains("://") {
            return target.parse();
        }
        if target.is_empty() || target.contains(['/', ':', ' ']) {
            return Err(Error::InvalidLocator {
                uri: target.to_owned(),
                reason: "expected a host name or a full locator URI".into(),
            });
        }
        Ok(Self {
            address: target.to_owned(),
            ..current.clone()
        })
    }

    /// Transport in use.
    #[must_use]
    pub const fn transport(&self) -> Transport {
        self.transport
    }

    /// Server host name or IP address.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Server port for the configured transport.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Transport specific parameters, without the leading slash.
    #[must_use]
    pub fn transport_params(&self) -> &str {
        &self.transport_params
    }

    /// Returns `true` when this locator points at `endpoint` over its own transport.
    #[must_use]
    pub fn targets(&self, endpoint: &ServerEndpoint) -> bool {
        self.address == endpoint.address() && self.port == endpoint.port_for(self.transport)
    }

    /// Compares host and port only, ignoring transport and parameters.
    #[must_use]
    pub fn same_host_port(&self, other: &Self) -> bool {
        self.address.eq_ignore_ascii_case(&other.address) && self.port == other.port
    }

    /// Returns `true` when the address only resolves on the local host.
    #[must_use]
    pub fn is_loopback(&self) -> bool {
        crate::endpoint::is_loopback_address(&self.address)
    }

    /// Renders the locator URI.
    #[must_use]
    pub fn to_uri(&self) -> String {
        self.to_string()
    }
}

impl Display for ServerLocator {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}:{}/{}",
            self.transport, self.address, self.port, self.transport_params
        )
    }
}

impl FromStr for ServerLocator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidLocator {
            uri: s.to_owned(),
            reason: reason.to_owned(),
        };

        let (scheme, rest) = s
            .trim()
            .split_once("://")
            .ok_or_else(|| invalid("missing `transport://` prefix"))?;
        let transport = scheme
            .parse::<Transport>()
            .map_err(|_| invalid("unknown transport"))?;
        let (host_port, params) = rest.split_once('/').unwrap_or((rest, ""));
        let (address, port) = host_port
            .rsplit_once(':')
            .ok_or_else(|| invalid("missing `:port`"))?;
        if address.is_empty() {
            return Err(invalid("address cannot be empty"));
        }
        let port = port.parse().map_err(|_| invalid("port is not a number"))?;

        Ok(Self {
            transport,
            address: address.to_owned(),
            port,
            transport_params: params.to_owned(),
        })
    }
}

impl TryFrom<String> for ServerLocator {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ServerLocator> for String {
    fn from(value: ServerLocator) -> Self {
        value.to_string()
    }
}
