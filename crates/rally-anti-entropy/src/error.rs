//! Anti-entropy session errors

use rally_core::WireError;
use rally_transport::TransportError;

/// Failures that end an anti-entropy session.
///
/// Missing versions are not errors; they are a normal protocol state
/// handled by request and response.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The peer sent text that does not decode; fatal to the connection
    #[error("malformed message from {peer}: {source}")]
    Wire {
        /// Peer label
        peer: String,
        /// Decode failure
        #[source]
        source: WireError,
    },

    /// The connection failed underneath the session
    #[error("transport failure with {peer}: {source}")]
    Transport {
        /// Peer label
        peer: String,
        /// Connection failure
        #[source]
        source: TransportError,
    },

    /// The peer announced a clock further ahead than this replica will
    /// request in one go; fatal to the connection
    #[error("{peer} announced {missing} missing versions, limit is {limit}")]
    HistoryGapTooLarge {
        /// Peer label
        peer: String,
        /// Dots the announced clock covers that this replica lacks
        missing: u64,
        /// Configured `max_missing_versions`
        limit: u64,
    },

    /// A local stop did not complete in time; the session was aborted
    #[error("session with {peer} did not stop within {timeout_ms}ms")]
    ShutdownTimeout {
        /// Peer label
        peer: String,
        /// Configured timeout
        timeout_ms: u64,
    },

    /// A session task panicked or was cancelled
    #[error("session task failed: {reason}")]
    TaskFailed {
        /// Panic or cancellation message
        reason: String,
    },

    /// Configuration rejected by validation
    #[error("invalid anti-entropy config: {reason}")]
    Config {
        /// Rejected setting
        reason: String,
    },
}

impl SyncError {
    /// Create a config validation error
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Create a task failure error
    pub fn task_failed(reason: impl std::fmt::Display) -> Self {
        Self::TaskFailed {
            reason: reason.to_string(),
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            SyncError::Wire { .. } => "sync_wire",
            SyncError::Transport { .. } => "sync_transport",
            SyncError::HistoryGapTooLarge { .. } => "sync_history_gap_too_large",
            SyncError::ShutdownTimeout { .. } => "sync_shutdown_timeout",
            SyncError::TaskFailed { .. } => "sync_task_failed",
            SyncError::Config { .. } => "sync_config",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_distinct() {
        let errors = [
            SyncError::Wire {
                peer: "p".into(),
                source: WireError::EmptyMessage,
            },
            SyncError::Transport {
                peer: "p".into(),
                source: TransportError::Closed,
            },
            SyncError::HistoryGapTooLarge {
                peer: "p".into(),
                missing: 2,
                limit: 1,
            },
            SyncError::ShutdownTimeout {
                peer: "p".into(),
                timeout_ms: 1,
            },
            SyncError::task_failed("boom"),
            SyncError::config("bad"),
        ];
        let mut codes: Vec<_> = errors.iter().map(SyncError::code).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn wire_error_names_peer_and_cause() {
        let err = SyncError::Wire {
            peer: "10.0.0.2:4000".into(),
            source: WireError::UnknownTag('x'),
        };
        assert_eq!(
            err.to_string(),
            "malformed message from 10.0.0.2:4000: unknown message tag 'x'"
        );
    }
}
