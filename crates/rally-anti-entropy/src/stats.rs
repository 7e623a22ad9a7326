//! Per-session counters

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by the tasks of one session.
#[derive(Debug, Default)]
pub struct SessionStats {
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
    versions_requested: AtomicU64,
    versions_received: AtomicU64,
    versions_served: AtomicU64,
}

/// Point-in-time copy of [`SessionStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStatsSnapshot {
    /// Messages written to the connection
    pub messages_sent: u64,
    /// Messages read from the connection
    pub messages_received: u64,
    /// Dots asked of the peer
    pub versions_requested: u64,
    /// Operations received from the peer
    pub versions_received: u64,
    /// Operations sent to the peer
    pub versions_served: u64,
}

impl SessionStats {
    pub(crate) fn record_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_requested(&self, count: usize) {
        self.versions_requested.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_versions_received(&self, count: usize) {
        self.versions_received.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_served(&self, count: usize) {
        self.versions_served.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Read every counter.
    pub fn snapshot(&self) -> SessionStatsSnapshot {
        SessionStatsSnapshot {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            versions_requested: self.versions_requested.load(Ordering::Relaxed),
            versions_received: self.versions_received.load(Ordering::Relaxed),
            versions_served: self.versions_served.load(Ordering::Relaxed),
        }
    }
}
