//! # Rally Transport - connections between peers
//!
//! The anti-entropy protocol exchanges whole text messages over a
//! bidirectional, ordered connection. This crate defines that boundary as the
//! [`Connection`] trait and ships two implementations:
//!
//! - [`MemoryConnection`]: a channel-backed pair for tests and in-process peers
//! - [`TcpConnection`]: one message per line over a TCP stream
//!
//! Message content is opaque here; framing is the only concern.

pub mod connection;
pub mod error;
pub mod memory;
pub mod tcp;

pub use connection::Connection;
pub use error::{TransportError, TransportResult};
pub use memory::MemoryConnection;
pub use tcp::{TcpAcceptor, TcpConnection};
