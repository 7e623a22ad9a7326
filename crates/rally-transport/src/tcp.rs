//! Newline-framed TCP connections
//!
//! Each message is one line. Messages containing `\n` are rejected before
//! anything is written, so a frame can never be split on the receiving side.

use crate::connection::Connection;
use crate::error::{TransportError, TransportResult};
use async_trait::async_trait;
use std::net::SocketAddr;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::Mutex;

/// A TCP stream carrying one message per line.
#[derive(Debug)]
pub struct TcpConnection {
    peer: SocketAddr,
    reader: Mutex<Lines<BufReader<OwnedReadHalf>>>,
    writer: Mutex<Option<OwnedWriteHalf>>,
}

impl TcpConnection {
    /// Wrap an established stream.
    pub fn new(stream: TcpStream) -> TransportResult<Self> {
        let peer = stream.peer_addr()?;
        stream.set_nodelay(true)?;
        let (read, write) = stream.into_split();
        Ok(Self {
            peer,
            reader: Mutex::new(BufReader::new(read).lines()),
            writer: Mutex::new(Some(write)),
        })
    }

    /// Connect to a listening peer.
    pub async fn connect(address: impl ToSocketAddrs + std::fmt::Display) -> TransportResult<Self> {
        let label = address.to_string();
        let stream = TcpStream::connect(address)
            .await
            .map_err(|err| TransportError::connection_failed(label.clone(), err))?;
        tracing::debug!(peer = %label, "connected");
        Self::new(stream)
    }

    /// Address of the remote end.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

#[async_trait]
impl Connection for TcpConnection {
    async fn send(&self, message: String) -> TransportResult<()> {
        if message.contains('\n') {
            return Err(TransportError::invalid_frame("message contains a newline"));
        }

        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(TransportError::Closed)?;
        let mut frame = message.into_bytes();
        frame.push(b'\n');
        writer.write_all(&frame).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn receive(&self) -> TransportResult<Option<String>> {
        Ok(self.reader.lock().await.next_line().await?)
    }

    async fn close(&self) {
        if let Some(mut writer) = self.writer.lock().await.take() {
            if let Err(err) = writer.shutdown().await {
                tracing::debug!(peer = %self.peer, error = %err, "shutdown after close failed");
            }
        }
    }

    fn peer_label(&self) -> String {
        self.peer.to_string()
    }
}

/// Listening socket producing [`TcpConnection`]s.
#[derive(Debug)]
pub struct TcpAcceptor {
    listener: TcpListener,
}

impl TcpAcceptor {
    /// Bind to `address`; port 0 picks a free port.
    pub async fn bind(address: impl ToSocketAddrs + std::fmt::Display) -> TransportResult<Self> {
        let label = address.to_string();
        let listener = TcpListener::bind(address)
            .await
            .map_err(|err| TransportError::connection_failed(label, err))?;
        tracing::info!(address = %listener.local_addr()?, "listening");
        Ok(Self { listener })
    }

    /// The bound address.
    pub fn local_addr(&self) -> TransportResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Wait for the next incoming connection.
    pub async fn accept(&self) -> TransportResult<TcpConnection> {
        let (stream, remote) = self.listener.accept().await?;
        tracing::debug!(peer = %remote, "accepted connection");
        TcpConnection::new(stream)
    }
}
