//! netcom-core: wire format, framing, endpoints and configuration.
//! Nothing in here touches a socket; the daemon and the ctl tool both
//! build on these pieces.

pub mod config;
pub mod endpoint;
pub mod frame;
pub mod wire;

pub use endpoint::{Endpoint, Protocol};
pub use frame::{FrameError, FrameReassembler};
pub use wire::{ClientRecord, Message, MessageKind, WireError};
