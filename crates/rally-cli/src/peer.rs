//! `rally peer`: one tracker replica kept in sync with every reachable peer
//!
//! Inbound connections each get a session; every configured peer gets a
//! dial loop that reconnects after the session ends. Stdin drives the local
//! replica until `quit` or end of input, then every session is stopped.

use crate::commands::{Command, HELP};
use crate::config::RallyConfig;
use rally_anti_entropy::{spawn_session, AntiEntropyConfig, SessionHandle};
use rally_core::ClientId;
use rally_transport::{Connection, TcpAcceptor, TcpConnection};
use rally_tracker::{TrackerRepository, TrackerState};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Run until stdin asks to quit.
pub async fn run(config: RallyConfig, client: ClientId) -> anyhow::Result<()> {
    let repository = Arc::new(TrackerRepository::new(client.clone(), TrackerState::default()));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = JoinSet::new();

    if let Some(listen) = config.listen {
        let acceptor = TcpAcceptor::bind(listen).await?;
        info!(client = %client, address = %acceptor.local_addr()?, "listening for peers");
        tasks.spawn(accept_loop(
            acceptor,
            repository.clone(),
            config.anti_entropy.clone(),
            shutdown_rx.clone(),
        ));
    }

    for peer in &config.peers {
        tasks.spawn(dial_loop(
            peer.clone(),
            repository.clone(),
            config.anti_entropy.clone(),
            config.reconnect_interval(),
            shutdown_rx.clone(),
        ));
    }

    info!(client = %client, peers = config.peers.len(), "replica ready");
    println!("{HELP}");
    command_loop(&repository).await?;

    let _ = shutdown_tx.send(true);
    while let Some(joined) = tasks.join_next().await {
        if let Err(err) = joined {
            warn!(error = %err, "connection task failed");
        }
    }
    info!(client = %client, version = %repository.current_version(), "replica stopped");
    Ok(())
}

async fn command_loop(repository: &TrackerRepository) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<Command>() {
            Ok(Command::Quit) => break,
            Ok(command) => match command.execute(repository) {
                Ok(output) => println!("{output}"),
                Err(err) => println!("error: {err}"),
            },
            Err(err) => println!("error: {err}"),
        }
    }
    Ok(())
}

/// Resolves once shutdown has been requested or its sender is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

async fn stop_session(session: SessionHandle) {
    let peer = session.peer().to_string();
    let stats = session.stats();
    match session.stop().await {
        Ok(()) => debug!(peer = %peer, ?stats, "session stopped"),
        Err(err) => warn!(peer = %peer, code = err.code(), error = %err, "session stop failed"),
    }
}

async fn accept_loop(
    acceptor: TcpAcceptor,
    repository: Arc<TrackerRepository>,
    config: AntiEntropyConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut sessions: Vec<SessionHandle> = Vec::new();
    loop {
        tokio::select! {
            _ = shutdown_requested(&mut shutdown) => break,
            accepted = acceptor.accept() => match accepted {
                Ok(connection) => {
                    sessions.retain(|session| !session.is_finished());
                    info!(peer = %connection.peer_label(), "peer connected");
                    sessions.push(spawn_session(repository.clone(), connection, config.clone()));
                }
                Err(err) => {
                    warn!(error = %err, "accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
        }
    }
    for session in sessions {
        stop_session(session).await;
    }
}

async fn dial_loop(
    address: String,
    repository: Arc<TrackerRepository>,
    config: AntiEntropyConfig,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        match TcpConnection::connect(address.as_str()).await {
            Ok(connection) => {
                info!(peer = %address, "connected to peer");
                let mut session = spawn_session(repository.clone(), connection, config.clone());
                let stopping = tokio::select! {
                    result = session.wait() => {
                        match result {
                            Ok(()) => info!(peer = %address, stats = ?session.stats(), "peer session ended"),
                            Err(err) => warn!(peer = %address, code = err.code(), error = %err, "peer session failed"),
                        }
                        false
                    }
                    _ = shutdown_requested(&mut shutdown) => true,
                };
                if stopping {
                    stop_session(session).await;
                    return;
                }
            }
            Err(err) => debug!(peer = %address, error = %err, "peer unreachable"),
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown_requested(&mut shutdown) => return,
        }
    }
}
