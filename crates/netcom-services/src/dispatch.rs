//! Routes a decoded message by kind to the registry and reply logic.

use std::io;

use netcom_core::frame::encode_frame;
use netcom_core::wire::{Message, MessageKind};

use crate::peer::PeerIdentity;
use crate::registry::{ConnectionRegistry, ReplyChannel};
use crate::status::LastError;

/// What a single dispatch did. Transports use it for logging; the registry
/// itself is the source of truth for whether the peer is still registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Subscribe created a new entry.
    Registered,
    /// Subscribe from a peer that already had an entry.
    AlreadyRegistered,
    /// Subscribe whose reply channel could not be opened.
    SubscribeFailed,
    /// Unsubscribe removed an entry.
    Unregistered,
    /// Unsubscribe from a peer with no entry.
    NotRegistered,
    /// InfoResponse sent on the peer's reply channel.
    Replied,
    /// InfoRequest from a peer with no entry: nowhere to send the answer.
    NoReplyChannel,
    /// InfoResponse could not be sent; the peer has been removed.
    ReplyFailed,
    /// Ping, or a kind the server does not act on.
    Ignored,
}

/// Per-message state machine, shared by every transport.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: ConnectionRegistry,
    last_error: LastError,
}

impl Dispatcher {
    pub fn new(registry: ConnectionRegistry, last_error: LastError) -> Self {
        Self {
            registry,
            last_error,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Handle one message from `peer`.
    ///
    /// `open_channel` is called with the message's reply port only when a
    /// Subscribe arrives from a peer that is not yet registered.
    pub fn dispatch<F>(
        &self,
        peer: PeerIdentity,
        message: &Message,
        open_channel: F,
    ) -> DispatchOutcome
    where
        F: FnOnce(u16) -> io::Result<Box<dyn ReplyChannel>>,
    {
        tracing::debug!(%peer, kind = ?message.kind, "incoming message");

        match message.kind {
            MessageKind::Subscribe => self.subscribe(peer, message.reply_port, open_channel),
            MessageKind::Unsubscribe => {
                if self.registry.remove(&peer).is_some() {
                    DispatchOutcome::Unregistered
                } else {
                    tracing::debug!(%peer, "unsubscribe from unregistered peer");
                    DispatchOutcome::NotRegistered
                }
            }
            MessageKind::InfoRequest => self.answer_info_request(peer),
            MessageKind::Ping => DispatchOutcome::Ignored,
            MessageKind::InfoResponse | MessageKind::Unknown => {
                tracing::debug!(
                    %peer,
                    kind = ?message.kind,
                    "message not expected by server, ignoring"
                );
                DispatchOutcome::Ignored
            }
        }
    }

    fn subscribe<F>(&self, peer: PeerIdentity, reply_port: u16, open_channel: F) -> DispatchOutcome
    where
        F: FnOnce(u16) -> io::Result<Box<dyn ReplyChannel>>,
    {
        if self.registry.contains(&peer) {
            return DispatchOutcome::AlreadyRegistered;
        }
        match open_channel(reply_port) {
            Ok(channel) => {
                if self.registry.add(peer, channel) {
                    DispatchOutcome::Registered
                } else {
                    DispatchOutcome::AlreadyRegistered
                }
            }
            Err(e) => {
                tracing::warn!(%peer, reply_port, error = %e, "failed to open reply channel");
                self.last_error
                    .set(format!("reply channel to {peer} (port {reply_port}): {e}"));
                DispatchOutcome::SubscribeFailed
            }
        }
    }

    fn answer_info_request(&self, peer: PeerIdentity) -> DispatchOutcome {
        if !self.registry.contains(&peer) {
            tracing::debug!(%peer, "info request from unregistered peer, dropping");
            return DispatchOutcome::NoReplyChannel;
        }

        let response = Message::info_response(self.registry.client_records());
        let frame = encode_frame(&response);

        match self.registry.send_to(&peer, frame) {
            Some(Ok(())) => {
                tracing::debug!(%peer, clients = response.clients.len(), "sent info response");
                DispatchOutcome::Replied
            }
            Some(Err(e)) => {
                tracing::warn!(%peer, error = %e, "failed to send info response, dropping peer");
                self.last_error.set(format!("send to {peer}: {e}"));
                self.registry.remove(&peer);
                DispatchOutcome::ReplyFailed
            }
            // Removed between the check and the send.
            None => DispatchOutcome::NoReplyChannel,
        }
    }
}
