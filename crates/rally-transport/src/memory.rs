//! In-memory connection pairs
//!
//! Each side owns the sending half of one bounded channel and the receiving
//! half of the other. Closing a side drops its sender, which the peer observes
//! as end of stream once every queued message has been read.

use crate::connection::Connection;
use crate::error::{TransportError, TransportResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

/// One end of an in-memory connection.
#[derive(Debug)]
pub struct MemoryConnection {
    label: String,
    outbound: Mutex<Option<mpsc::Sender<String>>>,
    inbound: tokio::sync::Mutex<mpsc::Receiver<String>>,
}

impl MemoryConnection {
    /// Create two connected ends, each buffering up to `capacity` messages.
    pub fn pair(capacity: usize) -> (Self, Self) {
        Self::labelled_pair(capacity, "memory-a", "memory-b")
    }

    /// Like [`MemoryConnection::pair`], naming each end's peer for logs.
    ///
    /// The first returned end talks to `second`, the second end to `first`.
    pub fn labelled_pair(capacity: usize, first: &str, second: &str) -> (Self, Self) {
        let capacity = capacity.max(1);
        let (to_second, from_first) = mpsc::channel(capacity);
        let (to_first, from_second) = mpsc::channel(capacity);

        let a = Self {
            label: second.to_string(),
            outbound: Mutex::new(Some(to_second)),
            inbound: tokio::sync::Mutex::new(from_second),
        };
        let b = Self {
            label: first.to_string(),
            outbound: Mutex::new(Some(to_first)),
            inbound: tokio::sync::Mutex::new(from_first),
        };
        (a, b)
    }

    /// True once this end has been closed locally.
    pub fn is_closed(&self) -> bool {
        self.outbound.lock().is_none()
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn send(&self, message: String) -> TransportResult<()> {
        let sender = self.outbound.lock().clone().ok_or(TransportError::Closed)?;
        sender.send(message).await.map_err(|_| TransportError::Closed)
    }

    async fn receive(&self) -> TransportResult<Option<String>> {
        Ok(self.inbound.lock().await.recv().await)
    }

    async fn close(&self) {
        if self.outbound.lock().take().is_some() {
            tracing::trace!(peer = %self.label, "memory connection closed");
        }
    }

    fn peer_label(&self) -> String {
        self.label.clone()
    }
}
