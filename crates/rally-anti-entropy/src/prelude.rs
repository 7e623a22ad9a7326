//! Rally anti-entropy prelude.
//!
//! Curated re-exports for wiring a replica to its peers.

pub use crate::{
    spawn_session, AntiEntropyConfig, HandlerOutcome, Message, ProtocolHandler, SessionHandle,
    SessionStatsSnapshot, SyncError,
};
pub use rally_journal::{InsertResult, Repository};
pub use rally_transport::{Connection, MemoryConnection, TcpAcceptor, TcpConnection};
