//! Service endpoints: `<protocol>://<address>:<port>`.
//!
//! The address doubles as an access rule. A loopback address is bound
//! directly. Any other concrete address makes the service bind the
//! unspecified address of the same family and accept traffic only from
//! that one remote.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Transport the service runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl FromStr for Protocol {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            _ => Err(EndpointError::UnknownProtocol(s.to_string())),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => f.write_str("tcp"),
            Protocol::Udp => f.write_str("udp"),
        }
    }
}

/// A canonicalised `(protocol, address, port)` tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub protocol: Protocol,
    pub address: IpAddr,
    pub port: u16,
}

impl Endpoint {
    pub fn new(protocol: Protocol, address: IpAddr, port: u16) -> Self {
        Self {
            protocol,
            address,
            port,
        }
    }

    /// Address the listening/receiving socket binds to.
    pub fn bind_addr(&self) -> SocketAddr {
        let ip = if self.address.is_loopback() {
            self.address
        } else {
            match self.address {
                IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
            }
        };
        SocketAddr::new(ip, self.port)
    }

    /// The only remote allowed to talk to the service, if restricted.
    pub fn allowed_remote(&self) -> Option<IpAddr> {
        if self.address.is_loopback() || self.address.is_unspecified() {
            None
        } else {
            Some(self.address)
        }
    }

    /// Whether traffic from `remote` may be processed.
    pub fn admits(&self, remote: IpAddr) -> bool {
        match self.allowed_remote() {
            Some(allowed) => canonical(remote) == canonical(allowed),
            None => true,
        }
    }
}

/// Fold IPv4-mapped IPv6 addresses back to IPv4 so a dual-stack socket
/// compares equal to the configured address.
fn canonical(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => IpAddr::V6(v6),
        },
        v4 => v4,
    }
}

/// Parse a host as written by a user: `localhost`, `@`/`*`/empty for any,
/// or an IP literal (IPv6 optionally bracketed).
pub fn parse_host(host: &str) -> Result<IpAddr, EndpointError> {
    let host = host.trim();
    match host {
        "" | "@" | "*" => Ok(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
        h if h.eq_ignore_ascii_case("localhost") => Ok(IpAddr::V4(Ipv4Addr::LOCALHOST)),
        h => {
            let inner = h
                .strip_prefix('[')
                .and_then(|s| s.strip_suffix(']'))
                .unwrap_or(h);
            inner
                .parse()
                .map_err(|_| EndpointError::BadAddress(host.to_string()))
        }
    }
}

impl FromStr for Endpoint {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scheme, rest) = s
            .split_once("://")
            .ok_or_else(|| EndpointError::Malformed(s.to_string()))?;
        let protocol: Protocol = scheme.parse()?;

        let (host, port) = if let Some(bracketed) = rest.strip_prefix('[') {
            let (host, after) = bracketed
                .split_once(']')
                .ok_or_else(|| EndpointError::Malformed(s.to_string()))?;
            let port = after
                .strip_prefix(':')
                .ok_or(EndpointError::MissingPort)?;
            (host, port)
        } else {
            rest.rsplit_once(':').ok_or(EndpointError::MissingPort)?
        };

        let port: u16 = port
            .trim_end_matches('/')
            .parse()
            .map_err(|_| EndpointError::BadPort(port.to_string()))?;

        Ok(Endpoint {
            protocol,
            address: parse_host(host)?,
            port,
        })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.address {
            IpAddr::V4(v4) => write!(f, "{}://{}:{}", self.protocol, v4, self.port),
            IpAddr::V6(v6) => write!(f, "{}://[{}]:{}", self.protocol, v6, self.port),
        }
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EndpointError {
    #[error("expected <protocol>://<address>:<port>, got {0:?}")]
    Malformed(String),
    #[error("unknown protocol {0:?} (expected tcp or udp)")]
    UnknownProtocol(String),
    #[error("missing port")]
    MissingPort,
    #[error("invalid address {0:?}")]
    BadAddress(String),
    #[error("invalid port {0:?}")]
    BadPort(String),
}
