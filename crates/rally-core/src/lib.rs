//! # Rally Core - causality and conflict-free primitives
//!
//! Foundation layer for peer-to-peer replication without a server:
//!
//! - [`causality`]: vector clocks, dots and per-operation metadata
//! - [`register`]: a multi-value register retaining concurrent writes
//! - [`growing_list`]: a predecessor-linked log with conflict-branch projection
//! - [`state`]: the contract an application state implements to be replicated
//! - [`codec`]: the text forms exchanged on the wire
//!
//! ## Design Principles
//!
//! - **Order independence**: applying operations in any causally-consistent
//!   order converges to the same state
//! - **Conflicts are data**: concurrent incompatible writes are kept and
//!   surfaced, never silently resolved
//! - **Index-based history**: operations reference each other by [`Dot`], so
//!   local and decoded remote operations resolve the same way

pub mod causality;
pub mod codec;
pub mod errors;
pub mod growing_list;
pub mod identifiers;
pub mod register;
pub mod state;

pub use causality::{ClockOrdering, Dot, Operation, OperationMetadata, VectorClock};
pub use codec::{PayloadCodec, WireError};
pub use errors::{RallyError, Result};
pub use growing_list::{ConflictState, GrowingListItem, ListEntry};
pub use identifiers::ClientId;
pub use register::Register;
pub use state::AbstractState;
