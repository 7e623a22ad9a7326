//! Anti-entropy message vocabulary

use rally_core::{Dot, Operation, VectorClock};

/// One protocol message between two replicas.
#[derive(Debug, Clone, PartialEq)]
pub enum Message<Op> {
    /// The sender's latest clock; sent on connect and after every change
    CurrentState(VectorClock),
    /// Dots the sender lacks relative to the announced clock
    RequestVersions(VectorClock, Vec<Dot>),
    /// Operations answering a request, tagged with the clock they complete
    SendVersions(VectorClock, Vec<Operation<Op>>),
    /// Graceful end of the session
    StopConnection,
}

impl<Op> Message<Op> {
    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::CurrentState(_) => "current_state",
            Message::RequestVersions(..) => "request_versions",
            Message::SendVersions(..) => "send_versions",
            Message::StopConnection => "stop_connection",
        }
    }
}
