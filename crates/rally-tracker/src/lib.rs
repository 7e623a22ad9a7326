//! # Rally Tracker - replicated initiative tracker
//!
//! The application shipped with Rally: a table of characters with names and
//! initiatives, plus the history of turns taken. Every field is a
//! [`rally_core::Register`], so concurrent edits from different replicas
//! are kept side by side instead of overwriting each other, and the turn
//! history is a growing list that can fork when two players act at once.
//!
//! Characters are identified by the [`rally_core::Dot`] of the operation
//! that added them.

pub mod codec;
pub mod ops;
pub mod state;

pub use ops::{TrackerOp, TurnAction};
pub use state::{turn_history, Character, RosterEntry, TrackerState, TurnEntry};

/// Version store holding a tracker.
pub type TrackerRepository = rally_journal::Repository<TrackerOp, TrackerState>;
