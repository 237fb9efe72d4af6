//! Multi-node propagation over localhost TCP.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use poha_ledger::{Blockchain, MemoryLedger};
use poha_network::{DiscoveryMessage, NetworkConfig, NetworkError, PeerNetwork};
use poha_types::{Address, Block, Timestamp, Transaction};
use poha_utils::ShutdownController;

struct TestNode {
    net: Arc<PeerNetwork>,
    ledger: Arc<MemoryLedger>,
}

fn config() -> NetworkConfig {
    NetworkConfig {
        listen_addr: "127.0.0.1:0".into(),
        discovery_interval: Duration::from_secs(3600),
        connect_timeout: Duration::from_secs(1),
        write_timeout: Duration::from_secs(1),
        read_timeout: Duration::from_secs(2),
        ..NetworkConfig::default()
    }
}

async fn start_with(config: NetworkConfig, shutdown: &ShutdownController) -> TestNode {
    let ledger = Arc::new(MemoryLedger::new());
    let net = PeerNetwork::bind(config, ledger.clone()).await.unwrap();
    net.spawn(shutdown).await.unwrap();
    TestNode { net, ledger }
}

async fn start(shutdown: &ShutdownController) -> TestNode {
    start_with(config(), shutdown).await
}

async fn dead_address() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);
    addr
}

async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

fn tx(value: u64) -> Transaction {
    Transaction::new("alice".into(), "bob".into(), value, None, Timestamp::new(1))
}

#[tokio::test]
async fn broadcast_reaches_live_peers_and_counts_the_rest() {
    let shutdown = ShutdownController::new();
    let a = start(&shutdown).await;
    let b = start(&shutdown).await;
    let c = start(&shutdown).await;

    a.net.connect_to_peer(b.net.self_address()).await.unwrap();
    a.net.connect_to_peer(c.net.self_address()).await.unwrap();
    let dead1 = dead_address().await;
    let dead2 = dead_address().await;
    a.net.peer_set().insert(&dead1).await.unwrap();
    a.net.peer_set().insert(&dead2).await.unwrap();

    let t = tx(7);
    let result = a.net.broadcast_transaction(&t).await.unwrap();
    assert_eq!(result.sent, 2);
    assert_eq!(result.failed, 2);

    let id = t.id;
    let (b_ledger, c_ledger) = (&b.ledger, &c.ledger);
    assert!(eventually(move || async move { b_ledger.contains_transaction(&id).await }).await);
    assert!(eventually(move || async move { c_ledger.contains_transaction(&id).await }).await);
    assert_eq!(a.net.peer_set().is_alive(&dead1).await, Some(false));
    assert_eq!(a.net.peer_set().is_alive(b.net.self_address()).await, Some(true));
    shutdown.shutdown();
}

#[tokio::test]
async fn connecting_twice_keeps_one_entry() {
    let shutdown = ShutdownController::new();
    let a = start(&shutdown).await;
    let b = start(&shutdown).await;

    assert!(a.net.connect_to_peer(b.net.self_address()).await.unwrap());
    assert!(!a.net.connect_to_peer(b.net.self_address()).await.unwrap());
    assert_eq!(a.net.peers().await, vec![b.net.self_address().to_string()]);

    assert!(!a.net.connect_to_peer(a.net.self_address()).await.unwrap());
    assert_eq!(a.net.peer_count().await, 1);
    shutdown.shutdown();
}

#[tokio::test]
async fn introduction_makes_the_link_bidirectional() {
    let shutdown = ShutdownController::new();
    let a = start(&shutdown).await;
    let b = start(&shutdown).await;

    a.net.connect_to_peer(b.net.self_address()).await.unwrap();
    let (b_net, a_addr) = (&b.net, a.net.self_address());
    assert!(eventually(move || async move { b_net.peer_set().contains(a_addr).await }).await);
    shutdown.shutdown();
}

#[tokio::test]
async fn discovery_listing_dials_new_peer() {
    let shutdown = ShutdownController::new();
    let p1 = start(&shutdown).await;
    let receiver = start(&shutdown).await;
    let p2 = start(&shutdown).await;

    let msg = DiscoveryMessage {
        peer_addresses: vec![p2.net.self_address().to_string()],
    };
    p1.net
        .send_to(receiver.net.self_address(), "discovery", &msg)
        .await
        .unwrap();

    let (net, p2_addr) = (&receiver.net, p2.net.self_address());
    assert!(eventually(move || async move { net.peer_set().contains(p2_addr).await }).await);
    shutdown.shutdown();
}

#[tokio::test]
async fn announce_spreads_the_peer_list() {
    let shutdown = ShutdownController::new();
    let a = start(&shutdown).await;
    let b = start(&shutdown).await;
    let c = start(&shutdown).await;

    a.net.connect_to_peer(b.net.self_address()).await.unwrap();
    a.net.connect_to_peer(c.net.self_address()).await.unwrap();
    a.net.announce().await.unwrap();

    let (b_net, c_addr) = (&b.net, c.net.self_address());
    assert!(eventually(move || async move { b_net.peer_set().contains(c_addr).await }).await);
    shutdown.shutdown();
}

#[tokio::test]
async fn block_propagates_to_peer_ledger() {
    let shutdown = ShutdownController::new();
    let a = start(&shutdown).await;
    let b = start(&shutdown).await;
    a.net.connect_to_peer(b.net.self_address()).await.unwrap();

    let block = Block::unsigned(
        1,
        Block::genesis().hash,
        Timestamp::new(10),
        vec![tx(1)],
        Address::from("V1"),
        "tok1".into(),
    );
    a.ledger.add_block(block.clone()).await.unwrap();
    let result = a.net.broadcast_block(&block).await.unwrap();
    assert_eq!(result.sent, 1);

    let b_ledger = &b.ledger;
    assert!(eventually(move || async move { b_ledger.height().await == 1 }).await);
    assert_eq!(b.ledger.block(1).await, Some(block));
    shutdown.shutdown();
}

#[tokio::test]
async fn oversized_and_unknown_messages_are_dropped() {
    let shutdown = ShutdownController::new();
    let a = start(&shutdown).await;
    let small = start_with(
        NetworkConfig {
            max_message_bytes: 64,
            ..config()
        },
        &shutdown,
    )
    .await;

    a.net
        .send_to(small.net.self_address(), "mystery", &serde_json::json!({}))
        .await
        .unwrap();

    let t = tx(3);
    a.net
        .send_to(small.net.self_address(), "transaction", &serde_json::json!({ "transaction": t }))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!small.ledger.contains_transaction(&t.id).await);
    assert_eq!(small.ledger.pending_count().await, 0);
    shutdown.shutdown();
}

#[tokio::test]
async fn custom_handlers_receive_their_type() {
    let shutdown = ShutdownController::new();
    let a = start(&shutdown).await;
    let b = start(&shutdown).await;

    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    b.net.handlers().register("ping", move |_| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    });

    a.net
        .send_to(b.net.self_address(), "ping", &serde_json::json!({}))
        .await
        .unwrap();
    let hits_ref = &hits;
    assert!(eventually(move || async move { hits_ref.load(Ordering::SeqCst) == 1 }).await);
    shutdown.shutdown();
}

#[tokio::test]
async fn bind_conflict_is_fatal() {
    let shutdown = ShutdownController::new();
    let a = start(&shutdown).await;
    let taken = NetworkConfig {
        listen_addr: a.net.local_addr().to_string(),
        ..config()
    };
    let err = PeerNetwork::bind(taken, Arc::new(MemoryLedger::new())).await;
    assert!(matches!(err, Err(NetworkError::Bind { .. })));
    shutdown.shutdown();
}

#[tokio::test]
async fn spawn_only_once() {
    let shutdown = ShutdownController::new();
    let a = start(&shutdown).await;
    assert!(matches!(
        a.net.spawn(&shutdown).await,
        Err(NetworkError::AlreadyStarted)
    ));
    shutdown.shutdown();
}

#[tokio::test]
async fn shutdown_closes_the_listener() {
    let shutdown = ShutdownController::new();
    let a = start(&shutdown).await;
    let b = start(&shutdown).await;
    let addr = a.net.self_address().to_string();

    shutdown.shutdown();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let result = b.net.send_to(&addr, "ping", &serde_json::json!({})).await;
    assert!(matches!(result, Err(NetworkError::ConnectionFailed { .. })));
}
