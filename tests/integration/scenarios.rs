//! End-to-end protocol flows: handshake, object creation, updates, fan-out.

use std::time::Duration;

use statecast_core::config::EchoSuppression;
use statecast_core::wire::{ObjectId, OBJECT_FRAME_LEN};

use crate::*;

// ── Handshake ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_handshake_registers_peer_once() {
    let relay = spawn_relay(EchoSuppression::Address, 1_000).await;
    let client = Client::connect(&relay).await.unwrap();

    client.handshake().await.unwrap();
    assert_eq!(relay.peers().lock().await.len(), 1);
    assert!(relay.peers().lock().await.contains(&client.addr()));

    // A repeated handshake is silent and does not add a second entry.
    client.send(b"a").await.unwrap();
    wait_for_received(&relay, 2).await.unwrap();
    assert!(client.drain_tagged(b'b', Duration::from_millis(50)).await.is_empty());
    assert_eq!(relay.peers().lock().await.len(), 1);

    relay.shutdown().await;
}

#[tokio::test]
async fn test_handled_handshake_is_visible_before_the_ack_is_read() {
    let relay = spawn_relay(EchoSuppression::Address, 1_000).await;
    let clients = [
        Client::connect(&relay).await.unwrap(),
        Client::connect(&relay).await.unwrap(),
        Client::connect(&relay).await.unwrap(),
    ];

    for client in &clients {
        client.send(b"a").await.unwrap();
    }
    wait_for_received(&relay, clients.len() as u64).await.unwrap();

    let peers = relay.peers().lock().await;
    assert_eq!(peers.len(), clients.len());
    assert!(clients.iter().all(|c| peers.contains(&c.addr())));
    drop(peers);

    relay.shutdown().await;
}

// ── Global objects ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_global_init_is_first_writer_wins() {
    let relay = spawn_relay(EchoSuppression::Address, 1_000).await;
    let client = Client::connect(&relay).await.unwrap();
    client.handshake().await.unwrap();

    client.send(&object_datagram(b'i', 0, 0, 7, 0xAA)).await.unwrap();
    client.send(&object_datagram(b'i', 0, 0, 7, 0xBB)).await.unwrap();
    wait_for_received(&relay, 3).await.unwrap();

    let world = relay.world().lock().await;
    let obj = world.get(ObjectId(7)).expect("object 7 exists");
    assert!(obj.frame.body.iter().all(|&b| b == 0xAA));
    assert_eq!(obj.last_update_timestamp, 0);
    assert!(!world.is_dirty(ObjectId(7)));
    assert_eq!(world.len(), 1);
    drop(world);

    relay.shutdown().await;
}

#[tokio::test]
async fn test_update_ordering_accepts_newer_rejects_older() {
    let relay = spawn_relay(EchoSuppression::Address, 1_000).await;
    let client = Client::connect(&relay).await.unwrap();
    client.handshake().await.unwrap();

    client.send(&object_datagram(b'i', 0, 0, 7, 0)).await.unwrap();
    client.send(&object_datagram(b'm', 10, 0, 7, 1)).await.unwrap();
    client.send(&object_datagram(b'm', 3, 0, 7, 2)).await.unwrap();
    wait_for_received(&relay, 4).await.unwrap();

    let stats = relay.stats().clone();
    wait_until("both updates judged", move || {
        let stats = stats.clone();
        async move {
            let s = stats.snapshot();
            s.updates_accepted + s.updates_rejected >= 2
        }
    })
    .await
    .unwrap();

    let snap = relay.stats().snapshot();
    assert_eq!(snap.updates_accepted, 1);
    assert_eq!(snap.updates_rejected, 1);

    let world = relay.world().lock().await;
    let obj = world.get(ObjectId(7)).unwrap();
    assert_eq!(obj.last_update_timestamp, 10);
    assert!(obj.frame.body.iter().all(|&b| b == 1));
    assert_eq!(obj.update_count, 1);
    drop(world);

    relay.shutdown().await;
}

#[tokio::test]
async fn test_update_for_unknown_object_creates_nothing() {
    let relay = spawn_relay(EchoSuppression::Address, 1_000).await;
    let client = Client::connect(&relay).await.unwrap();
    client.handshake().await.unwrap();

    client.send(&object_datagram(b'm', 1, 0, 42, 0)).await.unwrap();
    wait_for_received(&relay, 2).await.unwrap();

    let stats = relay.stats().clone();
    wait_until("update judged", move || {
        let stats = stats.clone();
        async move { stats.snapshot().updates_rejected >= 1 }
    })
    .await
    .unwrap();
    assert!(relay.world().lock().await.is_empty());

    relay.shutdown().await;
}

// ── Local objects ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_local_init_replies_with_id_mapping() {
    let relay = spawn_relay(EchoSuppression::Address, 1_000).await;
    let client = Client::connect(&relay).await.unwrap();
    client.handshake().await.unwrap();

    client.send(&object_datagram(b'j', 0, 5, 0, 0x11)).await.unwrap();
    let reply = client.recv_tagged(b'k').await.unwrap();
    assert_eq!(reply.len(), OBJECT_FRAME_LEN);
    assert_eq!(reply[1], 0, "first local id");
    assert_eq!(reply[4], 5, "echoes the client's local id");

    client.send(&object_datagram(b'j', 0, 6, 0, 0x22)).await.unwrap();
    let reply = client.recv_tagged(b'k').await.unwrap();
    assert_eq!(reply[1], 1);
    assert_eq!(reply[4], 6);

    assert_eq!(relay.world().lock().await.len(), 2);
    relay.shutdown().await;
}

#[tokio::test]
async fn test_local_ids_skip_existing_globals() {
    let relay = spawn_relay(EchoSuppression::Address, 1_000).await;
    let client = Client::connect(&relay).await.unwrap();
    client.handshake().await.unwrap();

    client.send(&object_datagram(b'i', 0, 0, 0, 0)).await.unwrap();
    wait_for_received(&relay, 2).await.unwrap();

    client.send(&object_datagram(b'j', 0, 9, 0, 0)).await.unwrap();
    let reply = client.recv_tagged(b'k').await.unwrap();
    assert_eq!(reply[1], 1, "id 0 is held by a global object");

    relay.shutdown().await;
}

// ── Fan-out ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_local_object_fans_out_to_other_peers_only() {
    // Both clients share 127.0.0.1, so compare whole endpoints.
    let relay = spawn_relay(EchoSuppression::Endpoint, 1_000).await;
    let a = Client::connect(&relay).await.unwrap();
    let b = Client::connect(&relay).await.unwrap();
    a.handshake().await.unwrap();
    b.handshake().await.unwrap();

    let sent = object_datagram(b'j', 0, 3, 0xC8, 0x5A);
    a.send(&sent).await.unwrap();
    let mapping = a.recv_tagged(b'k').await.unwrap();
    assert_eq!(mapping[1], 0);
    assert_eq!(mapping[4], 3);

    // Only the tag changes on the way out; the id byte is the client's own.
    let update = b.recv_tagged(b'n').await.unwrap();
    assert_eq!(update.len(), OBJECT_FRAME_LEN);
    assert_eq!(update[1..], sent[1..]);
    assert_eq!(update[5], 0xC8);

    assert!(
        a.drain_tagged(b'n', Duration::from_millis(100)).await.is_empty(),
        "origin never hears its own object"
    );

    relay.shutdown().await;
}

#[tokio::test]
async fn test_accepted_update_is_broadcast_once() {
    let relay = spawn_relay(EchoSuppression::Endpoint, 1_000).await;
    let a = Client::connect(&relay).await.unwrap();
    let b = Client::connect(&relay).await.unwrap();
    a.handshake().await.unwrap();
    b.handshake().await.unwrap();

    a.send(&object_datagram(b'i', 0, 0, 7, 0)).await.unwrap();
    a.send(&object_datagram(b'm', 4, 0, 7, 0x33)).await.unwrap();

    let update = b.recv_tagged(b'n').await.unwrap();
    assert_eq!(update[1], 4);
    assert_eq!(update[5], 7);

    // Dirty set was cleared by that tick; no repeats without new updates.
    assert!(b.drain_tagged(b'n', Duration::from_millis(100)).await.is_empty());

    relay.shutdown().await;
}

#[tokio::test]
async fn test_address_mode_suppresses_same_host_peers() {
    let relay = spawn_relay(EchoSuppression::Address, 1_000).await;
    let a = Client::connect(&relay).await.unwrap();
    let b = Client::connect(&relay).await.unwrap();
    a.handshake().await.unwrap();
    b.handshake().await.unwrap();

    a.send(&object_datagram(b'j', 0, 1, 0, 0)).await.unwrap();
    a.recv_tagged(b'k').await.unwrap();

    // Wait for the tick that clears the dirty set, then check b stayed quiet.
    let world = relay.world().clone();
    wait_until("dirty set drained", move || {
        let world = world.clone();
        async move {
            let dirty = world.lock().await.dirty_len();
            dirty == 0
        }
    })
    .await
    .unwrap();
    assert!(b.drain_tagged(b'n', Duration::from_millis(50)).await.is_empty());
    assert_eq!(relay.stats().snapshot().broadcasts_sent, 0);

    relay.shutdown().await;
}
