//! # Rally Journal - the version store
//!
//! Owns the authoritative, in-memory history of one replica:
//!
//! - assigns new local operations their dots and applies them
//! - detects exactly which remote operations are missing before a peer's
//!   clock can be merged
//! - gives random access to any applied operation by its dot
//! - publishes the current vector clock as a watch stream
//!
//! History is append-only and never pruned; durable persistence is out of
//! scope.

pub mod repository;

pub use repository::{InsertResult, Repository, Snapshot};
