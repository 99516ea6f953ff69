//! Transport adapters: turn socket activity into dispatcher calls.
//!
//! Both adapters share the codec, the frame reassembler, the registry and
//! the dispatcher; they differ only in how a peer becomes registered and
//! where its replies go.

use std::io;
use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpSocket, UdpSocket};
use tokio::sync::broadcast;

use netcom_core::config::LimitsConfig;
use netcom_core::frame::FrameReassembler;
use netcom_core::{Endpoint, Protocol};
use netcom_services::{ConnectionRegistry, Dispatcher, LastError, PeerIdentity};

pub mod tcp;
pub mod udp;

/// Everything a transport needs besides its socket.
#[derive(Debug, Clone)]
pub struct TransportContext {
    pub endpoint: Endpoint,
    pub limits: LimitsConfig,
    pub dispatcher: Dispatcher,
    pub last_error: LastError,
}

impl TransportContext {
    pub fn registry(&self) -> &ConnectionRegistry {
        self.dispatcher.registry()
    }

    pub fn new_reassembler(&self) -> FrameReassembler {
        FrameReassembler::with_max_frame(self.limits.max_frame_bytes)
    }

    /// Whether traffic from `peer` may be processed. Logs the rejection.
    fn admits(&self, peer: &PeerIdentity) -> bool {
        if self.endpoint.admits(peer.address()) {
            return true;
        }
        tracing::warn!(
            %peer,
            expected = %self.endpoint.address,
            "discarding traffic from unexpected remote"
        );
        false
    }
}

/// The bound socket of a running service.
#[derive(Debug)]
pub enum Listener {
    Tcp(TcpListener),
    Udp(UdpSocket),
}

impl Listener {
    /// Bind the listening (TCP) or receiving (UDP) socket for `endpoint`.
    pub async fn bind(endpoint: &Endpoint) -> io::Result<Self> {
        let addr = endpoint.bind_addr();
        match endpoint.protocol {
            Protocol::Tcp => {
                let socket = if addr.is_ipv4() {
                    TcpSocket::new_v4()?
                } else {
                    TcpSocket::new_v6()?
                };
                socket.set_reuseaddr(true)?;
                socket.bind(addr)?;
                Ok(Listener::Tcp(socket.listen(1024)?))
            }
            Protocol::Udp => Ok(Listener::Udp(UdpSocket::bind(addr).await?)),
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        match self {
            Listener::Tcp(l) => l.local_addr(),
            Listener::Udp(s) => s.local_addr(),
        }
    }

    /// Run until `shutdown` fires.
    pub async fn serve(self, ctx: TransportContext, shutdown: broadcast::Receiver<()>) {
        match self {
            Listener::Tcp(listener) => tcp::accept_loop(listener, ctx, shutdown).await,
            Listener::Udp(socket) => udp::receive_loop(socket, ctx, shutdown).await,
        }
    }
}

fn trace_payload(peer: &PeerIdentity, payload: &[u8]) {
    tracing::trace!(%peer, len = payload.len(), bytes = %hex::encode(payload), "frame");
}
