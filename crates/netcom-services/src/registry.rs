//! Connection registry: tracks who is currently registered.
//!
//! One entry per registered peer, keyed on `PeerIdentity`. For TCP an entry
//! exists for as long as the connection is open; for UDP from Subscribe
//! until Unsubscribe or a failed reply. There is no expiry: an entry lives
//! until something removes it.
//!
//! Each entry owns the peer's reply channel. Removing the entry drops the
//! channel, which is what closes the TCP connection or the UDP reply socket.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::mapref::one::Ref;
use dashmap::DashMap;

use netcom_core::wire::ClientRecord;

use crate::peer::PeerIdentity;

// ── Reply channel ─────────────────────────────────────────────────────────────

/// Where replies to a registered peer go.
///
/// Implementations must not block: a send either queues the frame or
/// fails immediately. Dropping the channel releases the underlying socket.
pub trait ReplyChannel: Send + Sync + fmt::Debug {
    fn send(&self, frame: Bytes) -> io::Result<()>;
}

// ── Entries ───────────────────────────────────────────────────────────────────

/// A registered peer. Owned exclusively by the registry.
#[derive(Debug)]
pub struct RegistryEntry {
    pub identity: PeerIdentity,
    /// Milliseconds since the Unix epoch.
    pub registered_at: i64,
    channel: Box<dyn ReplyChannel>,
}

impl RegistryEntry {
    pub fn channel(&self) -> &dyn ReplyChannel {
        self.channel.as_ref()
    }
}

/// Snapshot of one entry, as returned by `ConnectionRegistry::list`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisteredPeer {
    pub identity: PeerIdentity,
    pub registered_at: i64,
}

impl From<&RegisteredPeer> for ClientRecord {
    fn from(p: &RegisteredPeer) -> Self {
        ClientRecord::new(
            p.identity.address().to_string(),
            p.identity.port(),
            p.registered_at,
        )
    }
}

// ── Registry ──────────────────────────────────────────────────────────────────

/// Shared between the accept loop and every connection task.
/// DashMap serialises writers per shard, so add/remove/list need no
/// outer lock.
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    entries: Arc<DashMap<PeerIdentity, RegistryEntry>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `identity`, stamped with the current time.
    ///
    /// Returns false if it was already registered; the existing entry
    /// (and its timestamp) is kept and `channel` is dropped.
    pub fn add(&self, identity: PeerIdentity, channel: Box<dyn ReplyChannel>) -> bool {
        self.add_at(identity, channel, now_millis())
    }

    /// Like `add`, with an explicit registration time.
    pub fn add_at(
        &self,
        identity: PeerIdentity,
        channel: Box<dyn ReplyChannel>,
        registered_at: i64,
    ) -> bool {
        match self.entries.entry(identity) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(RegistryEntry {
                    identity,
                    registered_at,
                    channel,
                });
                tracing::info!(peer = %identity, registered_at, "added connection");
                true
            }
        }
    }

    /// Remove `identity` if present. Dropping the returned entry releases
    /// its reply channel.
    pub fn remove(&self, identity: &PeerIdentity) -> Option<RegistryEntry> {
        let removed = self.entries.remove(identity).map(|(_, entry)| entry);
        if removed.is_some() {
            tracing::info!(peer = %identity, "removed connection");
        }
        removed
    }

    /// Look up one entry. Do not hold the guard across another registry call.
    pub fn get(&self, identity: &PeerIdentity) -> Option<Ref<'_, PeerIdentity, RegistryEntry>> {
        self.entries.get(identity)
    }

    pub fn contains(&self, identity: &PeerIdentity) -> bool {
        self.entries.contains_key(identity)
    }

    /// Send `frame` on the peer's reply channel.
    ///
    /// `None` if the peer is not registered.
    pub fn send_to(&self, identity: &PeerIdentity, frame: Bytes) -> Option<io::Result<()>> {
        self.entries
            .get(identity)
            .map(|entry| entry.channel.send(frame))
    }

    /// Snapshot of every entry, oldest registration first (ties broken by
    /// identity so the order is fully deterministic).
    pub fn list(&self) -> Vec<RegisteredPeer> {
        let mut peers: Vec<RegisteredPeer> = self
            .entries
            .iter()
            .map(|e| RegisteredPeer {
                identity: e.identity,
                registered_at: e.registered_at,
            })
            .collect();
        peers.sort_by(|a, b| {
            a.registered_at
                .cmp(&b.registered_at)
                .then_with(|| a.identity.cmp(&b.identity))
        });
        peers
    }

    /// The current listing in wire form.
    pub fn client_records(&self) -> Vec<ClientRecord> {
        self.list().iter().map(ClientRecord::from).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry and its reply channel. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        if count > 0 {
            tracing::info!(count, "cleared connection registry");
        }
        count
    }
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
