//! # Rally Anti-Entropy - replica synchronization
//!
//! Two replicas converge by exchanging clocks and then exactly the
//! operations each one lacks:
//!
//! 1. Each side announces its clock with `CurrentState`, on connect and after
//!    every local change
//! 2. A side that finds the announced clock covers dots it lacks replies with
//!    `RequestVersions`
//! 3. The peer answers with `SendVersions`, which the requester inserts
//!
//! ## Design Principles
//!
//! - **Symmetric**: both ends run the same state machine
//! - **Idempotent handshake**: re-sending `CurrentState` is always safe, so
//!   reconnecting is just starting a new session
//! - **No retries here**: transport failures end the session; reconnecting
//!   belongs to whoever manages connections
//! - **Structured teardown**: a session's tasks are cancelled together

pub mod config;
pub mod error;
pub mod handler;
pub mod message;
pub mod prelude;
pub mod session;
pub mod stats;
pub mod wire;

pub use config::AntiEntropyConfig;
pub use error::SyncError;
pub use handler::{HandlerOutcome, ProtocolHandler};
pub use message::Message;
pub use session::{spawn_session, SessionHandle};
pub use stats::{SessionStats, SessionStatsSnapshot};
