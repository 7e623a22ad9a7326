//! End-to-end synchronization scenarios
//!
//! Replicas are driven either by hand through [`ProtocolHandler`] or by live
//! sessions over in-memory and TCP connections.

use assert_matches::assert_matches;
use rally_anti_entropy::{
    spawn_session, AntiEntropyConfig, HandlerOutcome, Message, ProtocolHandler, SyncError,
};
use rally_core::{ConflictState, Dot, VectorClock};
use rally_testkit::{
    all_operations, client, connect, replica, show_log, sync_by_hand, wait_for_convergence, TestOp,
};
use rally_transport::{Connection, MemoryConnection, TcpAcceptor, TcpConnection};
use std::collections::BTreeSet;
use std::time::Duration;

const CONVERGENCE_TIMEOUT: Duration = Duration::from_secs(5);

fn clock(entries: &[(&str, u64)]) -> VectorClock {
    entries.iter().map(|(c, n)| (client(c), *n)).collect()
}

fn dot(c: &str, n: u64) -> Dot {
    Dot::new(client(c), n)
}

#[test]
fn two_replicas_converge_by_hand() {
    let a = replica("a");
    let b = replica("b");
    a.produce([TestOp::write("x1"), TestOp::write("x2")]);
    b.produce([TestOp::write("y1")]);

    sync_by_hand(&a, &b);

    assert_eq!(a.current_version(), clock(&[("a", 2), ("b", 1)]));
    assert_eq!(b.current_version(), a.current_version());
    assert_eq!(a.state(), b.state());
    assert_eq!(a.state().value.text_field(), "x2 / y1");
}

#[test]
fn growing_list_branches_are_reported_then_agreed() {
    let a = replica("a");
    let b = replica("b");
    a.produce([TestOp::append("root", None)]);
    sync_by_hand(&a, &b);

    let root = dot("a", 1);
    a.produce([TestOp::append("a1", Some(root.clone()))]);
    a.produce([TestOp::append("a2", Some(dot("a", 2)))]);
    b.produce([TestOp::append("b1", Some(root.clone()))]);
    b.produce([TestOp::append("b2", Some(dot("b", 1)))]);

    // Each side alone sees one unforked list.
    assert!(show_log(&a).iter().all(|entry| entry.conflict.is_resolved()));
    assert!(show_log(&b).iter().all(|entry| entry.conflict.is_resolved()));

    // A learns B's branch first.
    let b_ops = all_operations(&b);
    assert!(a.insert(&b.current_version(), b_ops).is_success());
    let view = show_log(&a);
    assert_eq!(view.len(), 5);
    assert_eq!(view[0].dot, root);
    assert_eq!(view[0].conflict, ConflictState::InAllTimelines);

    // Tips in dot order: a:3 is timeline 0, b:2 is timeline 1.
    let only = |timeline: usize| ConflictState::InTimelines(BTreeSet::from([timeline]));
    for entry in &view[1..] {
        let expected = if entry.dot.client == client("a") { only(0) } else { only(1) };
        assert_eq!(entry.conflict, expected, "{}", entry.dot);
    }

    sync_by_hand(&a, &b);
    assert_eq!(show_log(&a), show_log(&b));
    assert_eq!(show_log(&b), view);
}

#[test]
fn request_for_unknown_dot_is_omitted_and_stays_missing() {
    let a = replica("a");
    let b = replica("b");
    a.produce([TestOp::write("x1"), TestOp::write("x2")]);
    let announced = clock(&[("a", 3)]);

    let requester = ProtocolHandler::new(b.clone(), "a");
    let responder = ProtocolHandler::new(a.clone(), "b");

    let HandlerOutcome::Reply(request) = requester
        .handle(Message::CurrentState(announced.clone()))
        .unwrap()
    else {
        panic!("expected a request for missing versions");
    };
    assert_eq!(
        request,
        vec![Message::RequestVersions(
            announced.clone(),
            vec![dot("a", 1), dot("a", 2), dot("a", 3)]
        )]
    );

    let HandlerOutcome::Reply(response) = responder.handle(request[0].clone()).unwrap() else {
        panic!("expected versions");
    };
    assert_matches!(&response[..], [Message::SendVersions(_, operations)] => {
        let dots: Vec<_> = operations.iter().map(|operation| operation.dot()).collect();
        assert_eq!(dots, vec![dot("a", 1), dot("a", 2)]);
    });

    assert_eq!(
        requester.handle(response[0].clone()).unwrap(),
        HandlerOutcome::Idle
    );
    let retry = b.insert(&announced, Vec::new());
    assert!(retry.missing().contains(&dot("a", 3)));
    assert!(b.is_empty());
}

#[tokio::test]
async fn sessions_converge_and_stop() {
    let a = replica("a");
    let b = replica("b");
    a.produce([TestOp::write("x1"), TestOp::write("x2")]);
    b.produce([TestOp::write("y1")]);

    let (session_a, session_b) = connect(&a, &b, AntiEntropyConfig::default());
    assert!(wait_for_convergence(&[&a, &b], CONVERGENCE_TIMEOUT).await);
    assert_eq!(a.current_version(), clock(&[("a", 2), ("b", 1)]));
    assert_eq!(a.state(), b.state());

    assert!(session_a.stats().versions_served >= 2);
    assert!(session_b.stats().versions_received >= 2);

    session_a.stop().await.unwrap();
    session_b.join().await.unwrap();
}

#[tokio::test]
async fn local_changes_propagate_while_connected() {
    let a = replica("a");
    let b = replica("b");
    let (session_a, session_b) = connect(&a, &b, AntiEntropyConfig::default());

    a.produce([TestOp::append("first", None)]);
    assert!(wait_for_convergence(&[&a, &b], CONVERGENCE_TIMEOUT).await);
    b.produce([TestOp::append("second", Some(dot("a", 1)))]);
    assert!(wait_for_convergence(&[&a, &b], CONVERGENCE_TIMEOUT).await);

    let items: Vec<_> = show_log(&a).into_iter().map(|entry| entry.item).collect();
    assert_eq!(items, vec!["first", "second"]);

    session_b.stop().await.unwrap();
    session_a.join().await.unwrap();
}

#[tokio::test]
async fn large_backlogs_are_served_in_chunks() {
    let a = replica("a");
    let b = replica("b");
    a.produce((0..20).map(|n| TestOp::write(&format!("v{n}"))));

    let config = AntiEntropyConfig {
        max_versions_per_message: 3,
        ..Default::default()
    };
    let (session_a, _session_b) = connect(&a, &b, config);
    assert!(wait_for_convergence(&[&a, &b], CONVERGENCE_TIMEOUT).await);
    assert_eq!(b.len(), 20);
    assert_eq!(a.state(), b.state());
    session_a.stop().await.unwrap();
}

#[tokio::test]
async fn both_sides_serving_backlogs_through_tiny_queues_converge() {
    let a = replica("a");
    let b = replica("b");
    a.produce((0..300).map(|n| TestOp::write(&format!("a{n}"))));
    b.produce((0..300).map(|n| TestOp::write(&format!("b{n}"))));

    let config = AntiEntropyConfig {
        channel_capacity: 1,
        max_versions_per_message: 1,
        ..Default::default()
    };
    let (session_a, session_b) = connect(&a, &b, config);
    assert!(wait_for_convergence(&[&a, &b], Duration::from_secs(20)).await);
    assert_eq!(a.len(), 600);
    assert_eq!(b.len(), 600);
    assert_eq!(a.state(), b.state());

    session_a.stop().await.unwrap();
    session_b.join().await.unwrap();
}

#[tokio::test]
async fn oversized_announced_clock_ends_only_the_session() {
    let a = replica("a");
    a.produce([TestOp::write("x")]);
    let (local, remote) = MemoryConnection::pair(8);
    let session = spawn_session(a.clone(), local, AntiEntropyConfig::default());

    assert_eq!(remote.receive().await.unwrap().as_deref(), Some("ca:1"));
    remote.send("cz:18446744073709551615".into()).await.unwrap();

    let ended = tokio::time::timeout(CONVERGENCE_TIMEOUT, session.join())
        .await
        .expect("session should end promptly");
    assert_matches!(ended, Err(SyncError::HistoryGapTooLarge { missing: u64::MAX, .. }));

    // The replica itself is untouched and still usable.
    assert_eq!(a.current_version(), clock(&[("a", 1)]));
    a.produce([TestOp::write("y")]);
    assert_eq!(a.len(), 2);
}

#[tokio::test]
async fn wire_exchange_with_a_scripted_peer() {
    let a = replica("a");
    a.produce([TestOp::write("x")]);
    let (local, remote) = MemoryConnection::pair(8);
    let session = spawn_session(a.clone(), local, AntiEntropyConfig::default());

    assert_eq!(remote.receive().await.unwrap().as_deref(), Some("ca:1"));
    remote.send("ra:1}a:1".into()).await.unwrap();
    assert_eq!(remote.receive().await.unwrap().as_deref(), Some("va:1}a:1%a%w78"));

    remote.send("s".into()).await.unwrap();
    session.join().await.unwrap();
    assert_eq!(remote.receive().await.unwrap(), None);
}

#[tokio::test]
async fn malformed_message_ends_the_session() {
    let a = replica("a");
    let (local, remote) = MemoryConnection::pair(8);
    let session = spawn_session(a, local, AntiEntropyConfig::default());

    remote.send("qnonsense".into()).await.unwrap();
    assert_matches!(session.join().await, Err(SyncError::Wire { .. }));
}

#[tokio::test]
async fn closed_connection_is_a_clean_stop() {
    let a = replica("a");
    let (local, remote) = MemoryConnection::pair(8);
    let session = spawn_session(a, local, AntiEntropyConfig::default());

    remote.close().await;
    session.join().await.unwrap();
}

#[tokio::test]
async fn sessions_converge_over_tcp() {
    let a = replica("a");
    let b = replica("b");
    a.produce([TestOp::write("over"), TestOp::append("tcp", None)]);
    b.produce([TestOp::write("wire")]);

    let acceptor = TcpAcceptor::bind("127.0.0.1:0").await.unwrap();
    let address = acceptor.local_addr().unwrap();
    let (dialed, accepted) = tokio::join!(TcpConnection::connect(address), acceptor.accept());

    let session_a = spawn_session(a.clone(), dialed.unwrap(), AntiEntropyConfig::default());
    let session_b = spawn_session(b.clone(), accepted.unwrap(), AntiEntropyConfig::default());

    assert!(wait_for_convergence(&[&a, &b], CONVERGENCE_TIMEOUT).await);
    assert_eq!(a.state(), b.state());

    session_a.stop().await.unwrap();
    session_b.join().await.unwrap();
}
