//! Vector clocks
//!
//! A [`VectorClock`] maps each client to the highest sequence number seen
//! from it. Absent clients count as 0, so clocks over different key sets stay
//! comparable. Zero entries are never stored, which keeps structural
//! equality identical to causal equality.

use super::dot::Dot;
use crate::identifiers::ClientId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Result of comparing two vector clocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClockOrdering {
    /// Every entry is equal
    Equal,
    /// `self` has seen everything `other` has, and more
    Greater,
    /// `other` has seen everything `self` has, and more
    Smaller,
    /// Each side has seen something the other has not
    Incomparable,
}

/// Per-client counters summarizing all causal history known to a replica.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VectorClock {
    entries: BTreeMap<ClientId, u64>,
}

impl VectorClock {
    /// Create an empty clock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a clock from `(client, sequence)` pairs. Zero sequences are
    /// dropped; repeated clients keep the maximum.
    pub fn from_entries(entries: impl IntoIterator<Item = (ClientId, u64)>) -> Self {
        let mut clock = Self::new();
        for (client, sequence) in entries {
            clock.observe(client, sequence);
        }
        clock
    }

    /// Highest sequence seen from `client` (0 when absent).
    pub fn get(&self, client: &ClientId) -> u64 {
        self.entries.get(client).copied().unwrap_or(0)
    }

    /// Raise the entry for `client` to at least `sequence`.
    pub fn observe(&mut self, client: ClientId, sequence: u64) {
        if sequence == 0 {
            return;
        }
        let entry = self.entries.entry(client).or_insert(0);
        if sequence > *entry {
            *entry = sequence;
        }
    }

    /// Iterate entries in client order.
    pub fn iter(&self) -> impl Iterator<Item = (&ClientId, u64)> {
        self.entries.iter().map(|(client, sequence)| (client, *sequence))
    }

    /// Number of clients with a non-zero entry.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing has been observed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all entries.
    ///
    /// Strictly increases along every happened-before edge, so sorting by it
    /// yields a linear extension of causality.
    pub fn total(&self) -> u64 {
        self.entries.values().sum()
    }

    /// Four-way causal comparison, treating missing entries as 0.
    pub fn compare(&self, other: &VectorClock) -> ClockOrdering {
        let mut self_ahead = false;
        let mut other_ahead = false;

        for client in self.entries.keys().chain(other.entries.keys()) {
            let mine = self.get(client);
            let theirs = other.get(client);
            if mine > theirs {
                self_ahead = true;
            } else if theirs > mine {
                other_ahead = true;
            }
            if self_ahead && other_ahead {
                return ClockOrdering::Incomparable;
            }
        }

        match (self_ahead, other_ahead) {
            (false, false) => ClockOrdering::Equal,
            (true, false) => ClockOrdering::Greater,
            (false, true) => ClockOrdering::Smaller,
            (true, true) => ClockOrdering::Incomparable,
        }
    }

    /// True when `self` dominates `other` (Equal or Greater).
    pub fn contains(&self, other: &VectorClock) -> bool {
        matches!(
            self.compare(other),
            ClockOrdering::Equal | ClockOrdering::Greater
        )
    }

    /// Pointwise maximum of both clocks.
    pub fn merge(&self, other: &VectorClock) -> VectorClock {
        let mut merged = self.clone();
        merged.merge_in_place(other);
        merged
    }

    /// Pointwise maximum, written into `self`.
    pub fn merge_in_place(&mut self, other: &VectorClock) {
        for (client, sequence) in other.iter() {
            self.observe(client.clone(), sequence);
        }
    }

    /// Clock after `client` produces one more operation.
    ///
    /// This is the only place sequence numbers are allocated, so no two
    /// operations from the same client share a dot.
    pub fn next(&self, client: &ClientId) -> VectorClock {
        let mut next = self.clone();
        let sequence = self.get(client).saturating_add(1);
        next.entries.insert(client.clone(), sequence);
        next
    }

    /// Every dot covered by `self` but not by `other`, in client then
    /// sequence order.
    pub fn versions_not_in(&self, other: &VectorClock) -> Vec<Dot> {
        let mut missing = Vec::new();
        for (client, sequence) in self.iter() {
            let known = other.get(client);
            for seq in (known + 1)..=sequence {
                missing.push(Dot::new(client.clone(), seq));
            }
        }
        missing
    }

    /// Number of dots [`VectorClock::versions_not_in`] would list, without
    /// allocating them. Saturates at `u64::MAX`.
    pub fn missing_count(&self, other: &VectorClock) -> u64 {
        self.iter().fold(0u64, |count, (client, sequence)| {
            count.saturating_add(sequence.saturating_sub(other.get(client)))
        })
    }

    /// True when the dot is covered by this clock.
    pub fn covers(&self, dot: &Dot) -> bool {
        dot.sequence <= self.get(&dot.client)
    }
}

impl FromIterator<(ClientId, u64)> for VectorClock {
    fn from_iter<I: IntoIterator<Item = (ClientId, u64)>>(iter: I) -> Self {
        Self::from_entries(iter)
    }
}
