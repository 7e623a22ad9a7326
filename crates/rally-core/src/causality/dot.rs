//! Operation identity

use crate::identifiers::ClientId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier of one operation: the producing client and its
/// sequence number (starting at 1).
///
/// Dots are never reused by the same client, so a dot is a stable key into
/// the version store for both local and freshly decoded remote operations.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Dot {
    /// Client that produced the operation
    pub client: ClientId,
    /// Per-client sequence number
    pub sequence: u64,
}

impl Dot {
    /// Create a dot.
    pub fn new(client: ClientId, sequence: u64) -> Self {
        Self { client, sequence }
    }
}

impl fmt::Display for Dot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.client, self.sequence)
    }
}
