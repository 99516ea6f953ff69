//! CLI command modules.

pub mod client;
pub mod list;
pub mod ping;
pub mod watch;
