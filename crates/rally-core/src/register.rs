//! Multi-value register
//!
//! A [`Register`] keeps every causally-maximal value ever written to it.
//! Concurrent writes are all retained; a write dominated by an existing entry
//! is dropped; a write that dominates existing entries replaces them. No two
//! retained entries are causally ordered with respect to each other.
//!
//! More than one entry means the replicas disagree and the application has to
//! resolve it. The register never picks a winner.

use crate::causality::{ClockOrdering, Dot, OperationMetadata};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Separator used when projecting conflicting values to text.
pub const CONFLICT_SEPARATOR: &str = " / ";

/// CRDT cell holding all causally-concurrent values of type `T`.
///
/// Entries are kept sorted by dot, so two registers holding the same
/// entries compare equal regardless of insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Register<T> {
    entries: Vec<(T, OperationMetadata)>,
}

impl<T> Default for Register<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T> Register<T> {
    /// An empty ("never set") register.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value written at `metadata`.
    ///
    /// Returns `false` when an existing entry already dominates the write.
    pub fn insert(&mut self, value: T, metadata: OperationMetadata) -> bool {
        let dominated = self.entries.iter().any(|(_, existing)| {
            matches!(
                existing.clock.compare(&metadata.clock),
                ClockOrdering::Equal | ClockOrdering::Greater
            )
        });
        if dominated {
            return false;
        }

        self.entries
            .retain(|(_, existing)| existing.clock.compare(&metadata.clock) != ClockOrdering::Smaller);
        let dot = metadata.to_dot();
        let position = self
            .entries
            .partition_point(|(_, existing)| existing.to_dot() < dot);
        self.entries.insert(position, (value, metadata));
        true
    }

    /// Borrow the retained values in dot order.
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().map(|(value, _)| value)
    }

    /// Iterate `(value, metadata)` pairs in dot order.
    pub fn iter(&self) -> impl Iterator<Item = (&T, &OperationMetadata)> {
        self.entries.iter().map(|(value, metadata)| (value, metadata))
    }

    /// Dots of the retained writes.
    pub fn dots(&self) -> Vec<Dot> {
        self.entries.iter().map(|(_, metadata)| metadata.to_dot()).collect()
    }

    /// The value when exactly one write is retained.
    pub fn value(&self) -> Option<&T> {
        match self.entries.as_slice() {
            [(value, _)] => Some(value),
            _ => None,
        }
    }

    /// True when concurrent writes need resolution.
    pub fn is_conflicted(&self) -> bool {
        self.entries.len() > 1
    }

    /// Number of retained writes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the register was never set.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: Clone> Register<T> {
    /// Insert every entry of `other`. Commutative and idempotent.
    pub fn merge(&mut self, other: &Register<T>) {
        for (value, metadata) in &other.entries {
            self.insert(value.clone(), metadata.clone());
        }
    }

    /// Non-mutating [`Register::merge`].
    pub fn merged(&self, other: &Register<T>) -> Register<T> {
        let mut merged = self.clone();
        merged.merge(other);
        merged
    }
}

impl<T: Display> Register<T> {
    /// Scalar text projection: empty, the single value, or every conflicting
    /// value joined by [`CONFLICT_SEPARATOR`].
    pub fn text_field(&self) -> String {
        self.values()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(CONFLICT_SEPARATOR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::causality::VectorClock;
    use crate::identifiers::ClientId;

    fn meta(client: &str, entries: &[(&str, u64)]) -> OperationMetadata {
        let clock: VectorClock = entries
            .iter()
            .map(|(c, s)| (ClientId::new(*c).unwrap(), *s))
            .collect();
        OperationMetadata::new(clock, ClientId::new(client).unwrap())
    }

    #[test]
    fn later_write_replaces_earlier() {
        let mut reg = Register::new();
        assert!(reg.insert("one", meta("a", &[("a", 1)])));
        assert!(reg.insert("two", meta("a", &[("a", 2)])));
        assert_eq!(reg.value(), Some(&"two"));
    }

    #[test]
    fn dominated_write_is_dropped() {
        let mut reg = Register::new();
        reg.insert("new", meta("a", &[("a", 2)]));
        assert!(!reg.insert("old", meta("a", &[("a", 1)])));
        assert!(!reg.insert("new", meta("a", &[("a", 2)])));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn concurrent_writes_are_all_kept() {
        let mut reg = Register::new();
        reg.insert("left", meta("a", &[("a", 1)]));
        reg.insert("right", meta("b", &[("b", 1)]));
        assert!(reg.is_conflicted());
        assert_eq!(reg.text_field(), "left / right");

        reg.insert("resolved", meta("a", &[("a", 2), ("b", 1)]));
        assert_eq!(reg.text_field(), "resolved");
    }

    #[test]
    fn empty_register_projects_to_empty_text() {
        let reg: Register<String> = Register::new();
        assert!(reg.is_empty());
        assert_eq!(reg.text_field(), "");
        assert_eq!(reg.value(), None);
    }

    #[test]
    fn merge_is_order_independent() {
        let mut r = Register::new();
        r.insert(1, meta("a", &[("a", 1)]));
        let mut s = Register::new();
        s.insert(2, meta("b", &[("b", 1)]));
        s.insert(3, meta("c", &[("c", 1)]));

        assert_eq!(r.merged(&s), s.merged(&r));
        assert_eq!(r.merged(&r), r);
    }
}
