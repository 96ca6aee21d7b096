//! End-to-end lock scenarios against an in-process server

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use common::TestServer;
use lockd_api::{Packet, PacketType};
use lockd_client::ClientError;

const SILENCE: Duration = Duration::from_millis(200);

#[tokio::test]
async fn test_exclusive_lock_handoff() {
    let server = TestServer::start().await;

    let mut a = server.raw().await;
    a.lock("printer").await;

    let mut b = server.raw().await;
    b.send(&Packet::lock_request("printer")).await;
    server.wait_for_waiters("printer", 1).await;
    b.expect_silence(SILENCE).await;

    a.close().await;

    let reply = b.recv().await.unwrap();
    assert_eq!(reply, Packet::ack(PacketType::Lock));
    assert_eq!(server.holders("printer"), 1);
}

#[tokio::test]
async fn test_counting_lock_admits_capacity() {
    let server = TestServer::start().await;

    let mut a = server.raw().await;
    let mut b = server.raw().await;
    let mut c = server.raw().await;
    a.lock("pool").await;
    b.lock("pool").await;

    c.send(&Packet::lock_request("pool")).await;
    server.wait_for_waiters("pool", 1).await;
    c.expect_silence(SILENCE).await;
    assert_eq!(server.holders("pool"), 2);

    b.close().await;
    assert!(c.recv().await.unwrap().is_ack());
    assert_eq!(server.holders("pool"), 2);

    a.close().await;
    server.wait_for_holders("pool", 1).await;
}

#[tokio::test]
async fn test_undefined_lock_closes_connection() {
    let server = TestServer::start().await;

    let mut conn = server.raw().await;
    conn.send(&Packet::lock_request("undefined")).await;
    conn.expect_closed().await;

    // The server keeps serving other clients
    let mut other = server.raw().await;
    other.lock("printer").await;
}

#[tokio::test]
async fn test_undefined_lock_releases_earlier_grants() {
    let server = TestServer::start().await;

    let mut conn = server.raw().await;
    conn.lock("printer").await;
    conn.send(&Packet::lock_request("undefined")).await;
    conn.expect_closed().await;

    server.wait_for_holders("printer", 0).await;
}

#[tokio::test]
async fn test_disconnect_releases_lock() {
    let server = TestServer::start().await;

    let mut client = server.client().await;
    client.lock("printer").await.unwrap();
    assert_eq!(server.holders("printer"), 1);

    drop(client);
    server.wait_for_holders("printer", 0).await;

    let mut next = server.client().await;
    next.lock_timeout("printer", Duration::from_secs(2))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_session_releases_every_held_lock() {
    let server = TestServer::start().await;

    let mut conn = server.raw().await;
    conn.lock("printer").await;
    conn.lock("pool").await;
    conn.lock("pool").await;
    assert_eq!(server.holders("printer"), 1);
    assert_eq!(server.holders("pool"), 2);

    conn.close().await;
    server.wait_for_holders("printer", 0).await;
    server.wait_for_holders("pool", 0).await;
}

#[tokio::test]
async fn test_waiter_that_disconnects_takes_no_slot() {
    let server = TestServer::start().await;

    let mut holder = server.raw().await;
    holder.lock("printer").await;

    let mut waiter = server.raw().await;
    waiter.send(&Packet::lock_request("printer")).await;
    server.wait_for_waiters("printer", 1).await;
    waiter.close().await;
    server.wait_for_waiters("printer", 0).await;

    holder.close().await;
    server.wait_for_holders("printer", 0).await;
}

#[tokio::test]
async fn test_liveness_check_gets_no_response() {
    let server = TestServer::start().await;

    let mut conn = server.raw().await;
    conn.send(&Packet::test()).await;
    conn.expect_silence(SILENCE).await;

    // The connection remains usable
    conn.lock("printer").await;
}

#[tokio::test]
async fn test_pipelined_requests() {
    let server = TestServer::start().await;

    let mut conn = server.raw().await;
    let mut frames = Vec::new();
    frames.extend_from_slice(&lockd_api::encode_frame(&Packet::lock_request("printer")).unwrap());
    frames.extend_from_slice(&lockd_api::encode_frame(&Packet::lock_request("pool")).unwrap());
    conn.send_raw(&frames).await;

    assert!(conn.recv().await.unwrap().is_ack());
    assert!(conn.recv().await.unwrap().is_ack());
    assert_eq!(server.holders("printer"), 1);
    assert_eq!(server.holders("pool"), 1);
}

#[tokio::test]
async fn test_raw_frame_bytes() {
    let server = TestServer::start().await;

    let mut conn = server.raw().await;
    conn.send_raw(br#"000027{"Type":1,"Data":"printer"}"#).await;
    let reply = conn.recv().await.unwrap();
    assert_eq!(reply.kind, PacketType::Lock);
    assert_eq!(reply.data, "true");
}

#[tokio::test]
async fn test_malformed_frame_closes_connection() {
    let server = TestServer::start().await;

    let mut conn = server.raw().await;
    conn.lock("printer").await;
    conn.send_raw(b"00x012{not json}").await;
    conn.expect_closed().await;

    server.wait_for_holders("printer", 0).await;
}

#[tokio::test]
async fn test_client_not_granted_for_undefined_lock() {
    let server = TestServer::start().await;

    let mut client = server.client().await;
    let err = client.lock("undefined").await.unwrap_err();
    assert!(matches!(err, ClientError::NotGranted(name) if name == "undefined"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_capacity_never_exceeded_under_contention() {
    let server = TestServer::start().await;
    let addr = server.addr().to_string();
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let addr = addr.clone();
        let in_flight = in_flight.clone();
        let peak = peak.clone();
        tasks.push(tokio::spawn(async move {
            for _ in 0..5 {
                let mut client = lockd_client::LockClient::connect(addr.clone())
                    .await
                    .unwrap();
                client.lock("pool").await.unwrap();

                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);

                client.close().await.unwrap();
            }
        }));
    }

    for task in tasks {
        task.await.unwrap();
    }

    assert!(peak.load(Ordering::SeqCst) <= 2);
    assert!(peak.load(Ordering::SeqCst) >= 1);
    server.wait_for_holders("pool", 0).await;
}

#[tokio::test]
async fn test_connection_counters() {
    let server = TestServer::start().await;

    let a = server.raw().await;
    let b = server.raw().await;
    let c = server.raw().await;
    server.wait_for_connections(3).await;
    assert_eq!(server.stats().total(), 3);
    assert_eq!(server.stats().max(), 3);
    assert_eq!(server.sessions().len(), 3);

    a.close().await;
    b.close().await;
    c.close().await;
    server.wait_for_connections(0).await;

    let snapshot = server.stats().snapshot();
    assert_eq!(snapshot.max, 3);
    assert_eq!(snapshot.total, 3);
    assert!(server.sessions().is_empty());
}

#[tokio::test]
async fn test_session_table_tracks_holders() {
    let server = TestServer::start().await;

    let mut conn = server.raw().await;
    conn.lock("printer").await;

    let holders = server.sessions().holders_of("printer");
    assert_eq!(holders.len(), 1);
    let info = server.sessions().get(holders[0]).unwrap();
    assert_eq!(info.held_locks, vec!["printer".to_string()]);
}

#[tokio::test]
async fn test_shutdown_wakes_waiters() {
    let server = TestServer::start().await;

    let mut holder = server.raw().await;
    holder.lock("printer").await;

    let mut waiter = server.raw().await;
    waiter.send(&Packet::lock_request("printer")).await;
    server.wait_for_waiters("printer", 1).await;

    server.stop().await;
    waiter.expect_closed().await;
}

#[tokio::test]
async fn test_no_locks_configured_rejects_everything() {
    let server = TestServer::start_with_locks("").await;
    assert!(server.registry().is_empty());

    let mut conn = server.raw().await;
    conn.send(&Packet::lock_request("printer")).await;
    conn.expect_closed().await;
}
