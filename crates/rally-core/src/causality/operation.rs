//! Operations tagged with their causal identity

use super::clock::VectorClock;
use super::dot::Dot;
use crate::identifiers::ClientId;
use serde::{Deserialize, Serialize};

/// The clock as of and including one operation, plus its author.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationMetadata {
    /// Vector clock including this operation
    pub clock: VectorClock,
    /// Client that produced the operation
    pub client: ClientId,
}

impl OperationMetadata {
    /// Create metadata from a clock and its author.
    pub fn new(clock: VectorClock, client: ClientId) -> Self {
        Self { clock, client }
    }

    /// `(client, clock[client])`
    pub fn to_dot(&self) -> Dot {
        Dot::new(self.client.clone(), self.clock.get(&self.client))
    }

    /// The clock immediately before this operation: own entry minus one.
    pub fn clock_before(&self) -> VectorClock {
        let own = self.clock.get(&self.client);
        let mut before: VectorClock = self
            .clock
            .iter()
            .filter(|(client, _)| **client != self.client)
            .map(|(client, sequence)| (client.clone(), sequence))
            .collect();
        before.observe(self.client.clone(), own.saturating_sub(1));
        before
    }

    /// Deterministic sort key consistent with causality.
    pub fn causal_key(&self) -> (u64, Dot) {
        (self.clock.total(), self.to_dot())
    }
}

/// A domain operation with its causal metadata. Immutable once created and
/// the only unit ever exchanged between peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation<Op> {
    /// Causal identity
    pub metadata: OperationMetadata,
    /// Application payload
    pub op: Op,
}

impl<Op> Operation<Op> {
    /// Wrap a payload with its metadata.
    pub fn new(metadata: OperationMetadata, op: Op) -> Self {
        Self { metadata, op }
    }

    /// The operation's unique dot.
    pub fn dot(&self) -> Dot {
        self.metadata.to_dot()
    }

    /// See [`OperationMetadata::causal_key`].
    pub fn causal_key(&self) -> (u64, Dot) {
        self.metadata.causal_key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ClientId {
        ClientId::new(s).unwrap()
    }

    #[test]
    fn dot_and_clock_before() {
        let clock: VectorClock = [(id("a"), 3), (id("b"), 1)].into_iter().collect();
        let meta = OperationMetadata::new(clock, id("a"));
        assert_eq!(meta.to_dot(), Dot::new(id("a"), 3));

        let before = meta.clock_before();
        assert_eq!(before.get(&id("a")), 2);
        assert_eq!(before.get(&id("b")), 1);
    }

    #[test]
    fn clock_before_first_operation_drops_own_entry() {
        let clock: VectorClock = [(id("a"), 1)].into_iter().collect();
        let meta = OperationMetadata::new(clock, id("a"));
        assert!(meta.clock_before().is_empty());
    }
}
