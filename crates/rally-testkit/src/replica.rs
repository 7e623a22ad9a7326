//! Replica helpers

use crate::fixtures::{TestOp, TestState};
use rally_anti_entropy::{spawn_session, AntiEntropyConfig, HandlerOutcome, Message, ProtocolHandler, SessionHandle};
use rally_core::{AbstractState, ClientId, ListEntry, Operation, PayloadCodec, VectorClock};
use rally_journal::Repository;
use rally_transport::MemoryConnection;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// Repository of the test application.
pub type TestRepository = Repository<TestOp, TestState>;

/// Bound on messages exchanged by [`sync_by_hand`].
const MAX_EXCHANGED: usize = 10_000;

/// Client identifier from a literal.
pub fn client(name: &str) -> ClientId {
    ClientId::new(name).expect("test client ids are valid")
}

/// Fresh, empty test replica.
pub fn replica(name: &str) -> Arc<TestRepository> {
    Arc::new(Repository::new(client(name), TestState::default()))
}

/// Every operation stored in `repository`.
pub fn all_operations<Op, S>(repository: &Repository<Op, S>) -> Vec<Operation<Op>>
where
    Op: Clone,
    S: AbstractState<Op>,
{
    let dots = repository.current_version().versions_not_in(&VectorClock::new());
    repository.fetch_versions(&dots)
}

#[derive(Clone, Copy)]
enum Side {
    A,
    B,
}

/// Run the protocol between two replicas without tasks or transport until
/// no message is left in flight, returning the number of messages handled.
///
/// A replica whose clock changes announces it again, as a session's
/// forwarder would.
pub fn sync_by_hand<Op, S>(a: &Arc<Repository<Op, S>>, b: &Arc<Repository<Op, S>>) -> usize
where
    Op: Clone,
    S: AbstractState<Op>,
{
    let handler_a = ProtocolHandler::new(a.clone(), "b");
    let handler_b = ProtocolHandler::new(b.clone(), "a");
    let mut in_flight: VecDeque<(Side, Message<Op>)> = VecDeque::new();
    in_flight.push_back((Side::B, Message::CurrentState(a.current_version())));
    in_flight.push_back((Side::A, Message::CurrentState(b.current_version())));

    let mut handled = 0;
    while let Some((to, message)) = in_flight.pop_front() {
        handled += 1;
        assert!(handled <= MAX_EXCHANGED, "replicas did not quiesce");

        let (handler, repository, reply_to) = match to {
            Side::A => (&handler_a, a, Side::B),
            Side::B => (&handler_b, b, Side::A),
        };
        let before = repository.current_version();
        let outcome = handler
            .handle(message)
            .expect("test histories stay within the gap limit");
        if let HandlerOutcome::Reply(replies) = outcome {
            in_flight.extend(replies.into_iter().map(|reply| (reply_to, reply)));
        }
        let after = repository.current_version();
        if after != before {
            in_flight.push_back((reply_to, Message::CurrentState(after)));
        }
    }
    handled
}

/// Connect two replicas with live sessions over an in-memory pair.
pub fn connect<Op, S>(
    a: &Arc<Repository<Op, S>>,
    b: &Arc<Repository<Op, S>>,
    config: AntiEntropyConfig,
) -> (SessionHandle, SessionHandle)
where
    Op: PayloadCodec + Clone + Send + Sync + 'static,
    S: AbstractState<Op> + Send + Sync + 'static,
{
    let (to_b, to_a) = MemoryConnection::labelled_pair(
        config.channel_capacity,
        a.client().as_str(),
        b.client().as_str(),
    );
    let session_a = spawn_session(a.clone(), to_b, config.clone());
    let session_b = spawn_session(b.clone(), to_a, config);
    (session_a, session_b)
}

/// Wait until every replica publishes the same clock, or `timeout` passes.
pub async fn wait_for_convergence<Op, S>(replicas: &[&Arc<Repository<Op, S>>], timeout: Duration) -> bool
where
    S: AbstractState<Op>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let mut clocks = replicas.iter().map(|replica| replica.current_version());
        let converged = match clocks.next() {
            Some(first) => clocks.all(|clock| clock == first),
            None => true,
        };
        if converged {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Project the test log of `repository` through the growing-list walk.
pub fn show_log(repository: &TestRepository) -> Vec<ListEntry<String>> {
    repository.read(|snapshot| {
        snapshot.state().log.show(|dot| {
            let operation = snapshot.fetch_version(dot)?;
            match &operation.op {
                TestOp::Append(item) => Some((item.clone(), operation.metadata.clone())),
                TestOp::Write(_) => None,
            }
        })
    })
}
