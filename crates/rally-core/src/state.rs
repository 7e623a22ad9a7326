//! Conflict-free state contract
//!
//! Any application state that implements [`AbstractState`] can be replicated
//! by the version store. Field-level merging is expected to go through
//! [`crate::Register`] and [`crate::GrowingListItem`] registers, which make
//! `apply` independent of the order concurrent operations arrive in.

use crate::causality::{Dot, Operation};

/// Merge contract for a replicated state.
///
/// The version store calls [`AbstractState::apply`] at most once per dot, and
/// only after every operation in the causal prefix of that dot has been
/// applied. Causally-unordered operations may arrive in any order.
pub trait AbstractState<Op> {
    /// Apply one operation and return the dots it made safe to prune.
    ///
    /// Returning an empty list is always correct; pruning is an optimization.
    fn apply(&mut self, operation: &Operation<Op>) -> Vec<Dot>;

    /// Causal parents `op` depends on; these must never be pruned.
    fn predecessors(op: &Op) -> Vec<Dot> {
        let _ = op;
        Vec::new()
    }
}
