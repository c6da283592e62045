//! End-to-end tests over real loopback TLS connections, covering the
//! basic send/ack round trip and reconnect-triggered retransmission.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

use dlc_agent::client::connect::Address;
use dlc_agent::client::{Agent, AgentConfig};
use dlc_agent::collector::Listener;
use dlc_agent::sink::SinkHandle;
use dlc_agent::stats::Stats;
use dlc_agent::transport::{handshake, tls, Identity};

/// Generate a CA plus one `localhost`-named collector leaf and one
/// arbitrarily-named client leaf into a fresh temp directory.
fn bootstrap_pki() -> (tempfile::TempDir, Identity, Identity) {
    let dir = tempfile::tempdir().unwrap();
    dlc_agent::pki::generate(dir.path(), &["localhost", "test-client"], false).unwrap();

    let collector = Identity {
        ca_bundle: dir.path().join("ca.crt.pem"),
        certificate: dir.path().join("localhost.crt.pem"),
        private_key: dir.path().join("localhost.key.pem"),
    };
    let client = Identity {
        ca_bundle: dir.path().join("ca.crt.pem"),
        certificate: dir.path().join("test-client.crt.pem"),
        private_key: dir.path().join("test-client.key.pem"),
    };
    (dir, collector, client)
}

async fn poll_until<F: Fn() -> bool>(condition: F, timeout: Duration) {
    let deadline = tokio::time::Instant::now() + timeout;
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "condition never became true");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn basic_send_and_ack_round_trip_s1() {
    let (_dir, collector_identity, client_identity) = bootstrap_pki();

    let (sink_tx, mut sink_rx) = tokio::sync::mpsc::channel::<Bytes>(16);
    let stats = Arc::new(Stats::new());
    let listener = Listener::bind(
        ("127.0.0.1", 0),
        &collector_identity,
        SinkHandle::new(sink_tx),
        stats,
        Duration::from_millis(50),
    )
    .await
    .unwrap();
    let port = listener.local_addr().unwrap().port();
    let _listener_task = tokio::spawn(listener.serve());

    let agent = Agent::start(AgentConfig {
        addresses: vec![Address {
            host: "localhost".to_string(),
            port,
        }],
        identity: client_identity,
        client_name: "test-agent".to_string(),
        ring_capacity: 16,
        stats_period: Duration::from_secs(3600),
        ..Default::default()
    });

    agent.send(Bytes::from_static(br#"{"level":"info","msg":"hello"}"#)).await;

    let received = tokio::time::timeout(Duration::from_secs(5), sink_rx.recv())
        .await
        .expect("sink did not receive the forwarded payload in time")
        .unwrap();
    let text = String::from_utf8(received.to_vec()).unwrap();
    assert!(text.contains(r#""msg":"hello""#));
    assert!(text.contains(r#""host""#), "collector should enrich with host: {}", text);

    poll_until(|| agent.queued() == 0, Duration::from_secs(5)).await;
}

/// Simulate a collector crash mid-session and a subsequent restart on the
/// same port: the message sent before the crash must still be in the ring
/// (never acked) and must be retransmitted once the client reconnects (S4).
#[tokio::test]
async fn reconnect_retransmits_unacked_message_s4() {
    let (_dir, collector_identity, client_identity) = bootstrap_pki();

    let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = tcp.local_addr().unwrap().port();
    let acceptor = TlsAcceptor::from(std::sync::Arc::new(
        tls::load_server_config(&collector_identity).unwrap(),
    ));

    let agent = Agent::start(AgentConfig {
        addresses: vec![Address {
            host: "localhost".to_string(),
            port,
        }],
        identity: client_identity,
        client_name: "test-agent".to_string(),
        ring_capacity: 16,
        stats_period: Duration::from_secs(3600),
        ..Default::default()
    });

    agent.send(Bytes::from_static(b"first message, never acked")).await;

    // First "collector instance": accept once, handshake, read exactly one
    // frame, then vanish without acking.
    {
        let (socket, _peer) = tcp.accept().await.unwrap();
        let mut stream = acceptor.accept(socket).await.unwrap();
        handshake::server::accept(&mut stream).await.unwrap();
        dlc_agent::transport::frame::decode_frame(&mut stream).await.unwrap();
        drop(stream);
    }
    drop(tcp);

    // The message is still queued: no ack was ever sent for it.
    assert_eq!(agent.queued(), 1);

    // Second "collector instance", bound to the same port, actually acks.
    let tcp2 = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
    let acceptor2 = acceptor.clone();
    let _second_instance = tokio::spawn(async move {
        loop {
            let (socket, _peer) = match tcp2.accept().await {
                Ok(pair) => pair,
                Err(_) => return,
            };
            let acceptor2 = acceptor2.clone();
            tokio::spawn(async move {
                let mut stream = match acceptor2.accept(socket).await {
                    Ok(s) => s,
                    Err(_) => return,
                };
                if handshake::server::accept(&mut stream).await.is_err() {
                    return;
                }
                loop {
                    match dlc_agent::transport::frame::decode_frame(&mut stream).await {
                        Ok(_payload) => {
                            use tokio::io::AsyncWriteExt;
                            if stream.write_all(&[0x06]).await.is_err() {
                                return;
                            }
                        }
                        Err(_) => return,
                    }
                }
            });
        }
    });

    // Generous timeout: if the client's reconnect attempt races ahead of the
    // second listener coming up, it pays one 15s failover backoff before
    // retrying.
    poll_until(|| agent.queued() == 0, Duration::from_secs(20)).await;
}

/// A first address whose peer completes TLS but then rejects the handshake
/// (replies with something other than the `DLCS` ack magic) must not wedge
/// the client: it should move on to the next configured address within the
/// same round, no failover backoff needed (S2).
#[tokio::test]
async fn handshake_rejection_fails_over_to_next_address_s2() {
    let (_dir, collector_identity, client_identity) = bootstrap_pki();

    let rejecting_tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let rejecting_port = rejecting_tcp.local_addr().unwrap().port();
    let rejecting_acceptor = TlsAcceptor::from(Arc::new(tls::load_server_config(&collector_identity).unwrap()));
    tokio::spawn(async move {
        loop {
            let (socket, _peer) = match rejecting_tcp.accept().await {
                Ok(pair) => pair,
                Err(_) => return,
            };
            let acceptor = rejecting_acceptor.clone();
            tokio::spawn(async move {
                use tokio::io::{AsyncReadExt, AsyncWriteExt};
                let mut stream = match acceptor.accept(socket).await {
                    Ok(s) => s,
                    Err(_) => return,
                };
                let mut discard = [0u8; 64];
                let _ = stream.read(&mut discard).await;
                let _ = stream.write_all(b"NOPE").await;
            });
        }
    });

    let (sink_tx, mut sink_rx) = tokio::sync::mpsc::channel::<Bytes>(16);
    let stats = Arc::new(Stats::new());
    let listener = Listener::bind(
        ("127.0.0.1", 0),
        &collector_identity,
        SinkHandle::new(sink_tx),
        stats,
        Duration::from_millis(50),
    )
    .await
    .unwrap();
    let good_port = listener.local_addr().unwrap().port();
    let _listener_task = tokio::spawn(listener.serve());

    let agent = Agent::start(AgentConfig {
        addresses: vec![
            Address {
                host: "localhost".to_string(),
                port: rejecting_port,
            },
            Address {
                host: "localhost".to_string(),
                port: good_port,
            },
        ],
        identity: client_identity,
        client_name: "test-agent".to_string(),
        ring_capacity: 16,
        stats_period: Duration::from_secs(3600),
        ..Default::default()
    });

    agent
        .send(Bytes::from_static(br#"{"level":"info","msg":"via-second-address"}"#))
        .await;

    let received = tokio::time::timeout(Duration::from_secs(5), sink_rx.recv())
        .await
        .expect("sink did not receive the forwarded payload in time")
        .unwrap();
    let text = String::from_utf8(received.to_vec()).unwrap();
    assert!(text.contains(r#""msg":"via-second-address""#));

    poll_until(|| agent.queued() == 0, Duration::from_secs(5)).await;
}

/// A first address with nothing listening must not block delivery: the
/// client should roll over to the second configured address within the same
/// round (S5).
#[tokio::test]
async fn address_failover_to_second_address_s5() {
    let (_dir, collector_identity, client_identity) = bootstrap_pki();

    let unused = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let unused_port = unused.local_addr().unwrap().port();
    drop(unused);

    let (sink_tx, mut sink_rx) = tokio::sync::mpsc::channel::<Bytes>(16);
    let stats = Arc::new(Stats::new());
    let listener = Listener::bind(
        ("127.0.0.1", 0),
        &collector_identity,
        SinkHandle::new(sink_tx),
        stats,
        Duration::from_millis(50),
    )
    .await
    .unwrap();
    let good_port = listener.local_addr().unwrap().port();
    let _listener_task = tokio::spawn(listener.serve());

    let agent = Agent::start(AgentConfig {
        addresses: vec![
            Address {
                host: "localhost".to_string(),
                port: unused_port,
            },
            Address {
                host: "localhost".to_string(),
                port: good_port,
            },
        ],
        identity: client_identity,
        client_name: "test-agent".to_string(),
        ring_capacity: 16,
        stats_period: Duration::from_secs(3600),
        ..Default::default()
    });

    agent.send(Bytes::from_static(br#"{"level":"info","msg":"via-failover"}"#)).await;

    let received = tokio::time::timeout(Duration::from_secs(5), sink_rx.recv())
        .await
        .expect("sink did not receive the forwarded payload in time")
        .unwrap();
    let text = String::from_utf8(received.to_vec()).unwrap();
    assert!(text.contains(r#""msg":"via-failover""#));

    poll_until(|| agent.queued() == 0, Duration::from_secs(5)).await;
}
