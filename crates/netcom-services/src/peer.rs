//! Remote endpoint identity.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// Address and port of a remote endpoint.
///
/// For UDP this is the only thing tying datagrams together: two datagrams
/// come from the same peer iff their source address and port are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerIdentity {
    address: IpAddr,
    port: u16,
}

impl PeerIdentity {
    pub fn new(address: IpAddr, port: u16) -> Self {
        Self { address, port }
    }

    pub fn address(&self) -> IpAddr {
        self.address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }

    /// Same host, different port. Used to address a peer's reply port.
    pub fn with_port(&self, port: u16) -> Self {
        Self {
            address: self.address,
            port,
        }
    }
}

impl From<SocketAddr> for PeerIdentity {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip(), addr.port())
    }
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.socket_addr().fmt(f)
    }
}
