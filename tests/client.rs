//! End-to-end tests driving the client against in-process UDP peers.

#![cfg(feature = "client")]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tokio::net::UdpSocket;

use radrelay::Outcome;
use radrelay::client::RadiusClient;
use radrelay::core::constants::HEADER_LEN;
use radrelay::core::{RetryPolicy, TransportConfig};
use radrelay::packet::{Attribute, PacketCode, attr, sign};

const SECRET: &str = "s3cr3t";

fn steve() -> Vec<Attribute> {
    vec![Attribute::text(attr::types::USER_NAME, "steve")]
}

/// A peer that answers every request with a bare, correctly signed reply of
/// the given code.
async fn spawn_replying_peer(reply_code: u8) -> SocketAddr {
    let sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = sock.local_addr().unwrap();
    tokio::spawn(async move {
        let mut buf = vec![0u8; 4096];
        loop {
            let Ok((len, from)) = sock.recv_from(&mut buf).await else {
                break;
            };
            if len < HEADER_LEN {
                continue;
            }
            let mut req_auth = [0u8; 16];
            req_auth.copy_from_slice(&buf[4..HEADER_LEN]);
            let mut reply = vec![reply_code, buf[1], 0, HEADER_LEN as u8];
            reply.extend_from_slice(&[0u8; 16]);
            sign(&mut reply, Some(&req_auth), SECRET.as_bytes()).unwrap();
            let _ = sock.send_to(&reply, from).await;
        }
    });
    addr
}

#[tokio::test]
async fn access_accept_resolves_success() {
    let addr = spawn_replying_peer(2).await;
    let config = TransportConfig::builder(addr)
        .secret(SECRET)
        .build()
        .unwrap();
    let client = RadiusClient::connect(config);

    let outcome = client
        .submit(PacketCode::AccessRequest, steve())
        .outcome()
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Success);
    client.shutdown();
}

#[tokio::test]
async fn access_reject_resolves_rejected() {
    let addr = spawn_replying_peer(3).await;
    let config = TransportConfig::builder(addr)
        .secret(SECRET)
        .build()
        .unwrap();
    let client = RadiusClient::connect(config);

    let outcome = client
        .submit(PacketCode::AccessRequest, steve())
        .outcome()
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Rejected);
    client.shutdown();
}

#[tokio::test]
async fn accounting_round_trip() {
    let addr = spawn_replying_peer(5).await;
    let config = TransportConfig::builder(addr)
        .secret(SECRET)
        .build()
        .unwrap();
    let client = RadiusClient::connect(config);

    let outcome = client
        .submit(
            PacketCode::AccountingRequest,
            vec![Attribute::new(attr::types::ACCT_STATUS_TYPE, vec![0, 0, 0, 1])],
        )
        .outcome()
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Success);
    client.shutdown();
}

#[tokio::test]
async fn concurrent_submissions_all_complete() {
    let addr = spawn_replying_peer(2).await;
    let config = TransportConfig::builder(addr)
        .secret(SECRET)
        .build()
        .unwrap();
    let client = RadiusClient::connect(config);

    let mut handles = Vec::new();
    for _ in 0..32 {
        handles.push(client.submit(PacketCode::AccessRequest, steve()));
    }
    for handle in handles {
        assert_eq!(handle.outcome().await.unwrap(), Outcome::Success);
    }
    client.shutdown();
}

#[tokio::test]
async fn silent_peer_times_out_after_two_attempts() {
    // A bound but never-replying peer, counting what reaches the wire.
    let sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = sock.local_addr().unwrap();
    let observed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&observed);
    tokio::spawn(async move {
        let mut buf = vec![0u8; 4096];
        while sock.recv_from(&mut buf).await.is_ok() {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    let config = TransportConfig::builder(addr)
        .secret(SECRET)
        .retry_default(RetryPolicy {
            irt: Duration::from_secs(1),
            mrt: Duration::from_secs(1),
            mrc: 2,
            mrd: Duration::from_secs(10),
        })
        .build()
        .unwrap();
    let client = RadiusClient::connect(config);

    let started = Instant::now();
    let outcome = client
        .submit(PacketCode::AccessRequest, steve())
        .outcome()
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert_eq!(outcome, Outcome::NoResponse);
    assert!(
        elapsed >= Duration::from_millis(1900),
        "gave up too early: {elapsed:?}"
    );

    // Both transmissions made it to the wire, and no more.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(observed.load(Ordering::SeqCst), 2);
    client.shutdown();
}
