//! Disconnects, timeouts, and traffic that only counts as liveness.

use std::time::Duration;

use statecast_core::config::EchoSuppression;

use crate::*;

// ── Explicit disconnect ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_disconnect_gets_single_notice_then_silence() {
    let relay = spawn_relay(EchoSuppression::Endpoint, 1_000).await;
    let a = Client::connect(&relay).await.unwrap();
    let b = Client::connect(&relay).await.unwrap();
    a.handshake().await.unwrap();
    b.handshake().await.unwrap();

    a.send(b"e").await.unwrap();
    let notice = a.recv_tagged(b'd').await.unwrap();
    assert_eq!(notice, b"d");

    let peers = relay.peers().clone();
    let a_addr = a.addr();
    wait_until("a removed", move || {
        let peers = peers.clone();
        async move {
            let present = peers.lock().await.contains(&a_addr);
            !present
        }
    })
    .await
    .unwrap();

    // b keeps producing; a must not hear any of it.
    b.send(&object_datagram(b'j', 0, 0, 0, 0)).await.unwrap();
    b.recv_tagged(b'k').await.unwrap();
    assert!(a.drain_tagged(b'n', Duration::from_millis(100)).await.is_empty());
    assert!(a.drain_tagged(b'd', Duration::from_millis(20)).await.is_empty());
    assert!(relay.peers().lock().await.contains(&b.addr()));

    relay.shutdown().await;
}

#[tokio::test]
async fn test_disconnect_from_unknown_endpoint_is_ignored() {
    let relay = spawn_relay(EchoSuppression::Address, 1_000).await;
    let stranger = Client::connect(&relay).await.unwrap();

    stranger.send(b"e").await.unwrap();
    wait_for_received(&relay, 1).await.unwrap();
    assert!(stranger.drain_tagged(b'd', Duration::from_millis(50)).await.is_empty());
    assert_eq!(relay.stats().snapshot().peers_evicted, 0);

    relay.shutdown().await;
}

// ── Timeout ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_silent_peer_times_out_with_one_notice() {
    let relay = spawn_relay(EchoSuppression::Address, 3).await;
    let client = Client::connect(&relay).await.unwrap();
    client.handshake().await.unwrap();

    let notice = client.recv_tagged(b'd').await.unwrap();
    assert_eq!(notice, b"d");
    assert!(client.drain_tagged(b'd', Duration::from_millis(50)).await.is_empty());
    assert!(relay.peers().lock().await.is_empty());
    assert_eq!(relay.stats().snapshot().peers_evicted, 1);

    relay.shutdown().await;
}

#[tokio::test]
async fn test_pings_keep_peer_alive() {
    let relay = spawn_relay(EchoSuppression::Address, 20).await;
    let client = Client::connect(&relay).await.unwrap();
    client.handshake().await.unwrap();

    // Ping well inside the 20-tick window for several windows' worth.
    for _ in 0..30 {
        client.send(b"c").await.unwrap();
        tokio::time::sleep(TEST_TICK).await;
    }
    assert!(relay.peers().lock().await.contains(&client.addr()));
    assert_eq!(relay.stats().snapshot().peers_evicted, 0);

    relay.shutdown().await;
}

#[tokio::test]
async fn test_unknown_tag_still_counts_as_liveness() {
    let relay = spawn_relay(EchoSuppression::Address, 1_000).await;
    let client = Client::connect(&relay).await.unwrap();
    client.handshake().await.unwrap();

    let peers = relay.peers().clone();
    let addr = client.addr();
    wait_until("peer aged", move || {
        let peers = peers.clone();
        async move {
            let ticks = peers.lock().await.get(&addr).map(|p| p.timeout_ticks);
            ticks.is_some_and(|t| t >= 40)
        }
    })
    .await
    .unwrap();

    client.send(b"zzz").await.unwrap();
    wait_for_received(&relay, 2).await.unwrap();

    let ticks = relay.peers().lock().await.get(&addr).unwrap().timeout_ticks;
    assert!(ticks < 40, "touch should reset the counter, got {ticks}");
    assert!(relay.stats().snapshot().datagrams_dropped >= 1);

    relay.shutdown().await;
}

#[tokio::test]
async fn test_empty_datagram_is_dropped_without_reply() {
    let relay = spawn_relay(EchoSuppression::Address, 1_000).await;
    let client = Client::connect(&relay).await.unwrap();

    client.send(&[]).await.unwrap();
    let stats = relay.stats().clone();
    wait_until("empty datagram dropped", move || {
        let stats = stats.clone();
        async move { stats.snapshot().datagrams_dropped >= 1 }
    })
    .await
    .unwrap();

    assert_eq!(relay.stats().snapshot().datagrams_received, 0);
    assert!(relay.peers().lock().await.is_empty());

    relay.shutdown().await;
}
