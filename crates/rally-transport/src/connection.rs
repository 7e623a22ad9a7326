//! Connection boundary

use crate::error::TransportResult;
use async_trait::async_trait;
use std::sync::Arc;

/// An ordered, bidirectional stream of text messages with one peer.
///
/// Sending and receiving may run concurrently from different tasks, so every
/// method takes `&self`.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Send one whole message.
    async fn send(&self, message: String) -> TransportResult<()>;

    /// Wait for the next message. `Ok(None)` means the peer closed cleanly.
    async fn receive(&self) -> TransportResult<Option<String>>;

    /// Close the sending side. Further sends fail with
    /// [`crate::TransportError::Closed`]; the peer sees end of stream.
    async fn close(&self);

    /// Human-readable description of the peer, for logs.
    fn peer_label(&self) -> String;
}

#[async_trait]
impl<C: Connection + ?Sized> Connection for Arc<C> {
    async fn send(&self, message: String) -> TransportResult<()> {
        (**self).send(message).await
    }

    async fn receive(&self) -> TransportResult<Option<String>> {
        (**self).receive().await
    }

    async fn close(&self) {
        (**self).close().await
    }

    fn peer_label(&self) -> String {
        (**self).peer_label()
    }
}

#[async_trait]
impl<C: Connection + ?Sized> Connection for Box<C> {
    async fn send(&self, message: String) -> TransportResult<()> {
        (**self).send(message).await
    }

    async fn receive(&self) -> TransportResult<Option<String>> {
        (**self).receive().await
    }

    async fn close(&self) {
        (**self).close().await
    }

    fn peer_label(&self) -> String {
        (**self).peer_label()
    }
}
