//! netcom-services: who is registered, and what to do with each message.
//!
//! Transport-agnostic: the daemon's TCP and UDP adapters both feed decoded
//! messages into the same `Dispatcher` and `ConnectionRegistry`.

pub mod dispatch;
pub mod peer;
pub mod registry;
pub mod status;

pub use dispatch::{DispatchOutcome, Dispatcher};
pub use peer::PeerIdentity;
pub use registry::{ConnectionRegistry, RegisteredPeer, ReplyChannel};
pub use status::LastError;
