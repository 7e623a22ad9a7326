//! Protocol state machine
//!
//! [`ProtocolHandler`] turns one inbound [`Message`] into the replies it
//! warrants. It performs no I/O, so the whole exchange can be driven by hand
//! in tests and the session runner only has to move messages around.

use crate::config::DEFAULT_MAX_MISSING_VERSIONS;
use crate::error::SyncError;
use crate::message::Message;
use crate::stats::SessionStats;
use rally_core::{AbstractState, Operation, VectorClock};
use parking_lot::Mutex;
use rally_journal::{InsertResult, Repository};
use std::sync::Arc;

/// What the session should do after handling a message.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerOutcome<Op> {
    /// Send these messages to the peer, in order
    Reply(Vec<Message<Op>>),
    /// Nothing to send
    Idle,
    /// The peer ended the session
    Stop,
}

/// Handles the messages of one connection against a shared repository.
pub struct ProtocolHandler<Op, S> {
    repository: Arc<Repository<Op, S>>,
    peer: String,
    max_versions_per_message: usize,
    max_missing_versions: u64,
    /// Merge of the peer clocks requested and not yet answered
    in_flight: Mutex<Option<VectorClock>>,
    stats: Arc<SessionStats>,
}

impl<Op, S> ProtocolHandler<Op, S>
where
    Op: Clone,
    S: AbstractState<Op>,
{
    /// Create a handler for messages from `peer`.
    pub fn new(repository: Arc<Repository<Op, S>>, peer: impl Into<String>) -> Self {
        Self {
            repository,
            peer: peer.into(),
            max_versions_per_message: usize::MAX,
            max_missing_versions: DEFAULT_MAX_MISSING_VERSIONS,
            in_flight: Mutex::new(None),
            stats: Arc::new(SessionStats::default()),
        }
    }

    /// Split `SendVersions` replies into chunks of at most `limit` operations.
    pub fn with_max_versions_per_message(mut self, limit: usize) -> Self {
        self.max_versions_per_message = limit.max(1);
        self
    }

    /// Refuse peer clocks that are more than `limit` dots ahead.
    pub fn with_max_missing_versions(mut self, limit: u64) -> Self {
        self.max_missing_versions = limit.max(1);
        self
    }

    /// Record counters into `stats` instead of a private instance.
    pub fn with_stats(mut self, stats: Arc<SessionStats>) -> Self {
        self.stats = stats;
        self
    }

    /// Counters recorded so far.
    pub fn stats(&self) -> &Arc<SessionStats> {
        &self.stats
    }

    /// Handle one inbound message.
    ///
    /// Fails only when the peer's clock is further ahead than
    /// `max_missing_versions`; the session must then end.
    pub fn handle(&self, message: Message<Op>) -> Result<HandlerOutcome<Op>, SyncError> {
        match message {
            Message::CurrentState(clock) => {
                self.check_gap(&clock)?;
                Ok(self.on_current_state(clock))
            }
            Message::RequestVersions(clock, dots) => {
                let found = self.repository.fetch_versions(&dots);
                if found.len() < dots.len() {
                    tracing::warn!(
                        peer = %self.peer,
                        requested = dots.len(),
                        found = found.len(),
                        "peer requested versions this replica does not have"
                    );
                }
                self.stats.record_served(found.len());
                Ok(HandlerOutcome::Reply(self.send_versions(clock, found)))
            }
            Message::SendVersions(clock, operations) => {
                self.check_gap(&clock)?;
                self.stats.record_versions_received(operations.len());
                let result = self.repository.insert(&clock, operations);
                let mut in_flight = self.in_flight.lock();
                match result {
                    InsertResult::Success(current) => {
                        tracing::trace!(peer = %self.peer, clock = %current, "versions applied");
                        if in_flight.as_ref().is_some_and(|requested| current.contains(requested)) {
                            *in_flight = None;
                        }
                    }
                    InsertResult::MissingVersions(dots) => {
                        // The next CurrentState from the peer re-requests the gap.
                        tracing::debug!(
                            peer = %self.peer,
                            missing = dots.len(),
                            "received versions still leave gaps"
                        );
                        *in_flight = None;
                    }
                }
                Ok(HandlerOutcome::Idle)
            }
            Message::StopConnection => Ok(HandlerOutcome::Stop),
        }
    }

    /// Count the gap before `insert` lists it dot by dot.
    fn check_gap(&self, clock: &VectorClock) -> Result<(), SyncError> {
        let missing = clock.missing_count(&self.repository.current_version());
        if missing > self.max_missing_versions {
            return Err(SyncError::HistoryGapTooLarge {
                peer: self.peer.clone(),
                missing,
                limit: self.max_missing_versions,
            });
        }
        Ok(())
    }

    fn on_current_state(&self, clock: VectorClock) -> HandlerOutcome<Op> {
        let current = self.repository.current_version();
        if self
            .in_flight
            .lock()
            .as_ref()
            .is_some_and(|requested| requested.merge(&current).contains(&clock))
        {
            tracing::trace!(peer = %self.peer, remote = %clock, "gap already requested");
            return HandlerOutcome::Idle;
        }

        match self.repository.insert(&clock, Vec::new()) {
            InsertResult::Success(_) => HandlerOutcome::Idle,
            InsertResult::MissingVersions(dots) => {
                self.in_flight
                    .lock()
                    .get_or_insert_with(VectorClock::new)
                    .merge_in_place(&clock);
                tracing::debug!(
                    peer = %self.peer,
                    missing = dots.len(),
                    remote = %clock,
                    "requesting missing versions"
                );
                self.stats.record_requested(dots.len());
                HandlerOutcome::Reply(vec![Message::RequestVersions(clock, dots)])
            }
        }
    }

    /// Build the `SendVersions` replies for `operations`.
    ///
    /// Operations go out in causal order. Every chunk but the last carries
    /// the merge of the clocks sent so far, so each one is a causally closed
    /// prefix the requester can insert on its own; the last carries the
    /// requested clock.
    fn send_versions(&self, clock: VectorClock, mut operations: Vec<Operation<Op>>) -> Vec<Message<Op>> {
        if operations.len() <= self.max_versions_per_message {
            return vec![Message::SendVersions(clock, operations)];
        }

        operations.sort_by_key(|operation| operation.causal_key());
        let total = operations.len();
        let mut replies = Vec::with_capacity(total.div_ceil(self.max_versions_per_message));
        let mut prefix = VectorClock::new();
        let mut remaining = operations.into_iter().peekable();

        while remaining.peek().is_some() {
            let chunk: Vec<_> = remaining.by_ref().take(self.max_versions_per_message).collect();
            for operation in &chunk {
                prefix.merge_in_place(&operation.metadata.clock);
            }
            let chunk_clock = if remaining.peek().is_some() {
                prefix.clone()
            } else {
                clock.clone()
            };
            replies.push(Message::SendVersions(chunk_clock, chunk));
        }

        tracing::debug!(peer = %self.peer, versions = total, chunks = replies.len(), "serving versions in chunks");
        replies
    }
}
