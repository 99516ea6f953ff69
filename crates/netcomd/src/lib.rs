//! netcomd: presence/registry service over TCP or UDP.
//!
//! The binary is a thin wrapper; everything it runs lives here so it can be
//! started in-process by tests.

pub mod server;
pub mod transport;

pub use server::{Server, ServerError};
