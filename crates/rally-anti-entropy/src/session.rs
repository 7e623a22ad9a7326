//! Per-connection session runner
//!
//! A session runs four tasks over one [`Connection`]:
//!
//! - **reader**: decodes inbound text and queues it for the handler
//! - **handler**: drives [`ProtocolHandler`] and queues its replies
//! - **forwarder**: announces the local clock on start and after every change
//! - **writer**: encodes queued messages onto the connection
//!
//! The tasks share one [`JoinSet`] owned by a supervisor. The session ends
//! when the handler stops, the writer finishes a local stop, or any task
//! fails; the remaining tasks are then aborted together and the connection
//! is closed.

use crate::config::AntiEntropyConfig;
use crate::error::SyncError;
use crate::handler::{HandlerOutcome, ProtocolHandler};
use crate::message::Message;
use crate::stats::{SessionStats, SessionStatsSnapshot};
use crate::wire;
use rally_core::{AbstractState, PayloadCodec};
use rally_journal::Repository;
use rally_transport::Connection;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Reader,
    Handler,
    Forwarder,
    Writer,
}

impl Role {
    /// Whether this task finishing cleanly ends the session. The reader and
    /// forwarder hand off to the handler and writer instead.
    fn ends_session(self) -> bool {
        matches!(self, Role::Handler | Role::Writer)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Reader => "reader",
            Role::Handler => "handler",
            Role::Forwarder => "forwarder",
            Role::Writer => "writer",
        })
    }
}

type TaskResult = (Role, Result<(), SyncError>);

/// Handle to a running session.
///
/// Dropping the handle aborts the session without notifying the peer.
#[derive(Debug)]
pub struct SessionHandle {
    peer: String,
    stop_tx: watch::Sender<bool>,
    stats: Arc<SessionStats>,
    config: AntiEntropyConfig,
    task: Option<JoinHandle<Result<(), SyncError>>>,
}

impl SessionHandle {
    /// Label of the remote peer.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Counters recorded so far.
    pub fn stats(&self) -> SessionStatsSnapshot {
        self.stats.snapshot()
    }

    /// True once every session task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Stop locally: send `StopConnection`, close the connection and wait
    /// for teardown, bounded by the configured shutdown timeout.
    pub async fn stop(mut self) -> Result<(), SyncError> {
        let _ = self.stop_tx.send(true);
        let Some(mut task) = self.task.take() else {
            return Ok(());
        };

        match tokio::time::timeout(self.config.shutdown_timeout(), &mut task).await {
            Ok(joined) => joined.map_err(SyncError::task_failed)?,
            Err(_) => {
                task.abort();
                tracing::warn!(peer = %self.peer, timeout_ms = self.config.shutdown_timeout_ms, "session stop timed out");
                Err(SyncError::ShutdownTimeout {
                    peer: self.peer.clone(),
                    timeout_ms: self.config.shutdown_timeout_ms,
                })
            }
        }
    }

    /// Wait for the session to end on its own, keeping the handle so it can
    /// still be stopped if this future is dropped first.
    pub async fn wait(&mut self) -> Result<(), SyncError> {
        let Some(task) = self.task.as_mut() else {
            return Ok(());
        };
        let joined = task.await;
        self.task = None;
        joined.map_err(SyncError::task_failed)?
    }

    /// Wait for the session to end on its own.
    pub async fn join(mut self) -> Result<(), SyncError> {
        match self.task.take() {
            Some(task) => task.await.map_err(SyncError::task_failed)?,
            None => Ok(()),
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Run the anti-entropy protocol for `repository` over `connection`.
///
/// Must be called from within a tokio runtime.
pub fn spawn_session<Op, S, C>(
    repository: Arc<Repository<Op, S>>,
    connection: C,
    config: AntiEntropyConfig,
) -> SessionHandle
where
    Op: PayloadCodec + Clone + Send + Sync + 'static,
    S: AbstractState<Op> + Send + Sync + 'static,
    C: Connection + 'static,
{
    let connection = Arc::new(connection);
    let peer = connection.peer_label();
    let stats = Arc::new(SessionStats::default());
    let capacity = config.channel_capacity.max(1);
    let (stop_tx, stop_rx) = watch::channel(false);
    let (inbound_tx, inbound_rx) = mpsc::channel::<Message<Op>>(capacity);
    let (outbound_tx, outbound_rx) = mpsc::channel::<Message<Op>>(capacity);

    let handler = ProtocolHandler::new(repository.clone(), peer.clone())
        .with_max_versions_per_message(config.max_versions_per_message)
        .with_max_missing_versions(config.max_missing_versions)
        .with_stats(stats.clone());

    let mut tasks: JoinSet<TaskResult> = JoinSet::new();
    tasks.spawn(run_reader::<Op, C>(
        connection.clone(),
        inbound_tx,
        peer.clone(),
        stats.clone(),
    ));
    tasks.spawn(run_handler(handler, inbound_rx, outbound_tx.clone()));
    tasks.spawn(run_forwarder(repository, outbound_tx));
    tasks.spawn(run_writer::<Op, C>(
        connection.clone(),
        outbound_rx,
        stop_rx,
        peer.clone(),
        stats.clone(),
    ));

    tracing::debug!(peer = %peer, "session started");
    let task = tokio::spawn(supervise(tasks, connection, peer.clone(), stats.clone()));

    SessionHandle {
        peer,
        stop_tx,
        stats,
        config,
        task: Some(task),
    }
}

async fn supervise<C: Connection>(
    mut tasks: JoinSet<TaskResult>,
    connection: Arc<C>,
    peer: String,
    stats: Arc<SessionStats>,
) -> Result<(), SyncError> {
    let outcome = loop {
        match tasks.join_next().await {
            Some(Ok((role, Ok(())))) if role.ends_session() => {
                tracing::trace!(peer = %peer, task = %role, "session task finished");
                break Ok(());
            }
            Some(Ok((role, Ok(())))) => {
                tracing::trace!(peer = %peer, task = %role, "session task finished");
            }
            Some(Ok((role, Err(err)))) => {
                tracing::trace!(peer = %peer, task = %role, code = err.code(), "session task failed");
                break Err(err);
            }
            Some(Err(join_error)) => break Err(SyncError::task_failed(join_error)),
            None => break Ok(()),
        }
    };

    tasks.shutdown().await;
    connection.close().await;

    let summary = stats.snapshot();
    match &outcome {
        Ok(()) => tracing::debug!(
            peer = %peer,
            sent = summary.messages_sent,
            received = summary.messages_received,
            versions_in = summary.versions_received,
            versions_out = summary.versions_served,
            "session ended"
        ),
        Err(err @ SyncError::Wire { .. }) => {
            tracing::error!(peer = %peer, error = %err, "session aborted on malformed message")
        }
        Err(err) => tracing::warn!(peer = %peer, error = %err, "session aborted"),
    }
    outcome
}

async fn run_reader<Op: PayloadCodec, C: Connection>(
    connection: Arc<C>,
    inbound: mpsc::Sender<Message<Op>>,
    peer: String,
    stats: Arc<SessionStats>,
) -> TaskResult {
    (Role::Reader, read_loop(&*connection, &inbound, &peer, &stats).await)
}

async fn read_loop<Op: PayloadCodec, C: Connection>(
    connection: &C,
    inbound: &mpsc::Sender<Message<Op>>,
    peer: &str,
    stats: &SessionStats,
) -> Result<(), SyncError> {
    loop {
        let text = match connection.receive().await {
            Ok(Some(text)) => text,
            Ok(None) => {
                tracing::debug!(peer = %peer, "peer closed the connection");
                let _ = inbound.send(Message::StopConnection).await;
                return Ok(());
            }
            Err(source) => {
                return Err(SyncError::Transport {
                    peer: peer.to_string(),
                    source,
                })
            }
        };

        stats.record_received();
        let message = wire::decode::<Op>(&text).map_err(|source| SyncError::Wire {
            peer: peer.to_string(),
            source,
        })?;
        tracing::trace!(peer = %peer, kind = message.kind(), "received");

        if inbound.send(message).await.is_err() {
            return Ok(());
        }
    }
}

async fn run_handler<Op, S>(
    handler: ProtocolHandler<Op, S>,
    inbound: mpsc::Receiver<Message<Op>>,
    outbound: mpsc::Sender<Message<Op>>,
) -> TaskResult
where
    Op: Clone,
    S: AbstractState<Op>,
{
    (Role::Handler, handle_loop(handler, inbound, outbound).await)
}

/// Replies wait in a local outbox and go out one per free outbound slot, so
/// inbound keeps draining while the peer is slow to read.
async fn handle_loop<Op, S>(
    handler: ProtocolHandler<Op, S>,
    mut inbound: mpsc::Receiver<Message<Op>>,
    outbound: mpsc::Sender<Message<Op>>,
) -> Result<(), SyncError>
where
    Op: Clone,
    S: AbstractState<Op>,
{
    let mut outbox: VecDeque<Message<Op>> = VecDeque::new();
    loop {
        tokio::select! {
            biased;
            permit = outbound.reserve(), if !outbox.is_empty() => {
                let Ok(permit) = permit else {
                    return Ok(());
                };
                if let Some(message) = outbox.pop_front() {
                    permit.send(message);
                }
            }
            message = inbound.recv() => {
                let Some(message) = message else {
                    return Ok(());
                };
                match handler.handle(message)? {
                    HandlerOutcome::Reply(replies) => outbox.extend(replies),
                    HandlerOutcome::Idle => {}
                    HandlerOutcome::Stop => return Ok(()),
                }
            }
        }
    }
}

async fn run_forwarder<Op, S>(
    repository: Arc<Repository<Op, S>>,
    outbound: mpsc::Sender<Message<Op>>,
) -> TaskResult
where
    S: AbstractState<Op>,
{
    let mut updates = repository.subscribe();
    loop {
        let clock = updates.borrow_and_update().clone();
        if outbound.send(Message::CurrentState(clock)).await.is_err() {
            break;
        }
        if updates.changed().await.is_err() {
            break;
        }
    }
    (Role::Forwarder, Ok(()))
}

async fn run_writer<Op: PayloadCodec, C: Connection>(
    connection: Arc<C>,
    outbound: mpsc::Receiver<Message<Op>>,
    stop_rx: watch::Receiver<bool>,
    peer: String,
    stats: Arc<SessionStats>,
) -> TaskResult {
    (
        Role::Writer,
        write_loop(&*connection, outbound, stop_rx, &peer, &stats).await,
    )
}

async fn write_loop<Op: PayloadCodec, C: Connection>(
    connection: &C,
    mut outbound: mpsc::Receiver<Message<Op>>,
    mut stop_rx: watch::Receiver<bool>,
    peer: &str,
    stats: &SessionStats,
) -> Result<(), SyncError> {
    loop {
        tokio::select! {
            biased;
            _ = async { let _ = stop_rx.wait_for(|stop| *stop).await; } => {
                tracing::debug!(peer = %peer, "stopping session");
                send_message(connection, Message::<Op>::StopConnection, peer, stats).await?;
                connection.close().await;
                return Ok(());
            }
            message = outbound.recv() => match message {
                Some(message) => send_message(connection, message, peer, stats).await?,
                None => return Ok(()),
            },
        }
    }
}

async fn send_message<Op: PayloadCodec, C: Connection>(
    connection: &C,
    message: Message<Op>,
    peer: &str,
    stats: &SessionStats,
) -> Result<(), SyncError> {
    tracing::trace!(peer = %peer, kind = message.kind(), "sending");
    connection
        .send(wire::encode(&message))
        .await
        .map_err(|source| SyncError::Transport {
            peer: peer.to_string(),
            source,
        })?;
    stats.record_sent();
    Ok(())
}
