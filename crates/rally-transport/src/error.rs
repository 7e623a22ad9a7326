//! Transport errors

/// Failures at the connection boundary.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection was closed locally or by the peer
    #[error("connection closed")]
    Closed,

    /// Underlying I/O failed
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The message cannot be framed by this transport
    #[error("invalid frame: {reason}")]
    InvalidFrame {
        /// Why the message was refused
        reason: String,
    },

    /// Could not establish a connection
    #[error("failed to connect to {address}: {reason}")]
    ConnectionFailed {
        /// Address that was dialled or bound
        address: String,
        /// Underlying failure
        reason: String,
    },
}

impl TransportError {
    /// Create an invalid frame error
    pub fn invalid_frame(reason: impl Into<String>) -> Self {
        Self::InvalidFrame {
            reason: reason.into(),
        }
    }

    /// Create a connection failure for `address`
    pub fn connection_failed(address: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::ConnectionFailed {
            address: address.into(),
            reason: reason.to_string(),
        }
    }

    /// True when the connection is gone rather than misused.
    pub fn is_closed(&self) -> bool {
        match self {
            TransportError::Closed => true,
            TransportError::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;
