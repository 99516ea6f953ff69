//! UDP adapter.
//!
//! A single bound socket receives every datagram. There is no connection
//! state at the transport level, so a peer is whatever source address and
//! port a datagram carries, and registration is explicit: Subscribe opens a
//! second socket connected to `(peer address, reply_port)` and stores it in
//! the registry as the peer's reply channel. Unsubscribe drops it.
//!
//! Reassembly buffers are keyed by peer identity and owned by the receive
//! loop; a message may span datagrams, and one datagram may carry several
//! frames.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use bytes::Bytes;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::broadcast;

use netcom_core::frame::FrameReassembler;
use netcom_core::wire::Message;
use netcom_services::{PeerIdentity, ReplyChannel};

use super::{trace_payload, TransportContext};

/// Largest UDP payload over IPv4. Bigger frames go out in several datagrams.
pub const MAX_DATAGRAM: usize = 65_507;

// ── Reply channel ─────────────────────────────────────────────────────────────

/// Outbound socket connected to a subscriber's reply port.
#[derive(Debug)]
pub struct UdpReply {
    socket: UdpSocket,
    target: SocketAddr,
}

impl UdpReply {
    /// Open a socket connected to `peer`'s address at `reply_port`.
    /// A reply port of 0 means "reply to the port you sent from".
    pub fn open(peer: &PeerIdentity, reply_port: u16) -> io::Result<Self> {
        let port = if reply_port == 0 { peer.port() } else { reply_port };
        let target = peer.with_port(port).socket_addr();

        let socket = Socket::new(Domain::for_address(target), Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_nonblocking(true)?;
        let local: SocketAddr = match target {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        socket.bind(&local.into())?;
        socket.connect(&target.into())?;

        let socket = UdpSocket::from_std(socket.into())?;
        tracing::debug!(%peer, %target, "opened reply socket");
        Ok(Self { socket, target })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }
}

impl ReplyChannel for UdpReply {
    fn send(&self, frame: Bytes) -> io::Result<()> {
        for chunk in frame.chunks(MAX_DATAGRAM) {
            match self.socket.try_send(chunk) {
                Ok(_) => {}
                // Fire and forget: a full socket buffer loses the datagram,
                // like the network would.
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    tracing::debug!(target = %self.target, "reply socket busy, datagram dropped");
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

// ── Reassembly buffers ────────────────────────────────────────────────────────

/// Reassembly buffers of the receive loop.
///
/// A registered peer keeps its buffer until it unregisters. An unregistered
/// peer keeps one only while it holds a partial frame (e.g. a Subscribe
/// split across datagrams), and at most `max_pending` such buffers exist at
/// once: the oldest is discarded to make room.
#[derive(Debug)]
pub struct PeerBuffers {
    buffers: HashMap<PeerIdentity, FrameReassembler>,
    /// Unregistered peers holding a partial frame, oldest first.
    pending: VecDeque<PeerIdentity>,
    max_pending: usize,
}

impl PeerBuffers {
    pub fn new(max_pending: usize) -> Self {
        Self {
            buffers: HashMap::new(),
            pending: VecDeque::new(),
            max_pending,
        }
    }

    pub fn contains(&self, peer: &PeerIdentity) -> bool {
        self.buffers.contains_key(peer)
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Buffers held for unregistered peers.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    fn get_or_create(
        &mut self,
        peer: PeerIdentity,
        create: impl FnOnce() -> FrameReassembler,
    ) -> &mut FrameReassembler {
        self.buffers.entry(peer).or_insert_with(create)
    }

    fn discard(&mut self, peer: &PeerIdentity) {
        self.buffers.remove(peer);
        self.forget_pending(peer);
    }

    /// `peer` is registered: its buffer is no longer subject to eviction.
    fn keep_registered(&mut self, peer: &PeerIdentity) {
        self.forget_pending(peer);
    }

    /// `peer` is unregistered and holds a partial frame.
    fn keep_pending(&mut self, peer: PeerIdentity) {
        if !self.pending.contains(&peer) {
            self.pending.push_back(peer);
        }
        while self.pending.len() > self.max_pending {
            let Some(oldest) = self.pending.pop_front() else {
                break;
            };
            self.buffers.remove(&oldest);
            tracing::debug!(peer = %oldest, "discarding partial frame from unregistered peer");
        }
    }

    fn forget_pending(&mut self, peer: &PeerIdentity) {
        if !self.pending.is_empty() {
            self.pending.retain(|p| p != peer);
        }
    }
}

// ── Receive loop ──────────────────────────────────────────────────────────────

/// Receive until `shutdown` fires. Partial frames are discarded on exit.
pub async fn receive_loop(
    socket: UdpSocket,
    ctx: TransportContext,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut buf = vec![0u8; ctx.limits.recv_buffer_bytes.max(1)];
    let mut buffers = PeerBuffers::new(ctx.limits.max_pending_peers);

    match socket.local_addr() {
        Ok(addr) => tracing::info!(%addr, "udp receiver starting"),
        Err(e) => tracing::warn!(error = %e, "udp receiver starting, local address unknown"),
    }

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!(pending_buffers = buffers.len(), "udp receiver shutting down");
                return;
            }

            result = socket.recv_from(&mut buf) => {
                let (len, from) = match result {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!(error = %e, "recv_from failed");
                        ctx.last_error.set(format!("recv_from: {e}"));
                        continue;
                    }
                };
                handle_datagram(&ctx, &mut buffers, PeerIdentity::from(from), &buf[..len]);
            }
        }
    }
}

/// Feed one datagram into `peer`'s buffer and dispatch every complete frame.
pub fn handle_datagram(
    ctx: &TransportContext,
    buffers: &mut PeerBuffers,
    peer: PeerIdentity,
    datagram: &[u8],
) {
    if !ctx.admits(&peer) {
        return;
    }

    let was_registered = ctx.registry().contains(&peer);
    let reassembler = buffers.get_or_create(peer, || ctx.new_reassembler());
    reassembler.push(datagram);

    loop {
        let payload = match reassembler.next_frame() {
            Ok(Some(p)) => p,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(%peer, error = %e, "framing violation, dropping peer");
                ctx.last_error.set(format!("{peer}: {e}"));
                buffers.discard(&peer);
                ctx.registry().remove(&peer);
                return;
            }
        };
        trace_payload(&peer, &payload);

        match Message::decode(&payload) {
            Ok(message) => {
                let outcome = ctx.dispatcher.dispatch(peer, &message, |reply_port| {
                    UdpReply::open(&peer, reply_port).map(|r| Box::new(r) as Box<dyn ReplyChannel>)
                });
                tracing::trace!(%peer, ?outcome, "dispatched");
            }
            Err(e) => {
                tracing::warn!(%peer, error = %e, "undecodable message, ignoring");
                ctx.last_error.set(format!("{peer}: {e}"));
            }
        }
    }

    // The buffer goes with the registration.
    if ctx.registry().contains(&peer) {
        buffers.keep_registered(&peer);
    } else if was_registered || reassembler.is_empty() {
        buffers.discard(&peer);
    } else {
        buffers.keep_pending(peer);
    }
}
