//! Transport protocols used between the agent and its servers.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Transport used to reach a server.
///
/// Each transport is either plaintext or secure; the secure flavour selects
/// the secure port of a [`ServerEndpoint`](crate::ServerEndpoint).
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Transport {
    /// Raw socket transport.
    #[default]
    Socket,
    /// TLS wrapped socket transport.
    SslSocket,
    /// HTTP servlet transport.
    Servlet,
    /// HTTPS servlet transport.
    SslServlet,
}

impl Transport {
    /// Returns the scheme string used in locator URIs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Socket => "socket",
            Self::SslSocket => "sslsocket",
            Self::Servlet => "servlet",
            Self::SslServlet => "sslservlet",
        }
    }

    /// Returns `true` when the transport is encrypted.
    #[must_use]
    pub const fn is_secure(self) -> bool {
        matches!(self, Self::SslSocket | Self::SslServlet)
    }
}

impl Display for Transport {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Transport {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "socket" => Ok(Self::Socket),
            "sslsocket" => Ok(Self::SslSocket),
            "servlet" => Ok(Self::Servlet),
            "sslservlet" => Ok(Self::SslServlet),
            _ => Err(Error::UnknownTransport(s.to_owned())),
        }
    }
}

impl TryFrom<String> for Transport {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Transport> for String {
    fn from(value: Transport) -> Self {
        value.as_str().to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("SSLSocket".parse::<Transport>().unwrap(), Transport::SslSocket);
        assert!(Transport::SslServlet.is_secure());
        assert!(!Transport::Servlet.is_secure());
    }

    #[test]
    fn rejects_unknown_transport() {
        let err = "carrier-pigeon".parse::<Transport>().unwrap_err();
        assert_eq!(err, Error::UnknownTransport("carrier-pigeon".into()));
    }
}
