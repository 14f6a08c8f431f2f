#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! End-to-end session scenarios over in-memory duplex links and real
//! TCP/TLS sockets.

use framelink::config::LinkConfig;
use framelink::core::packet::{Packet, PacketKind};
use framelink::session::{CloseReason, Session, SessionEvent, SessionRole, SessionState};
use framelink::transport::{tcp, tls};
use framelink::utils::archive::{pack_tree, unpack_tree};
use framelink::utils::Metrics;
use framelink::WireError;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

fn metrics() -> Arc<Metrics> {
    Arc::new(Metrics::new())
}

async fn next_packet(events: &mut mpsc::Receiver<SessionEvent>) -> Packet {
    loop {
        match events.recv().await.expect("event channel closed") {
            SessionEvent::Packet(packet) => return packet,
            SessionEvent::Authenticated { .. } => {}
            other => panic!("unexpected event {other:?}"),
        }
    }
}

fn duplex_pair(
    config: &LinkConfig,
) -> (
    (Session, mpsc::Receiver<SessionEvent>),
    (Session, mpsc::Receiver<SessionEvent>),
) {
    let (client_io, server_io) = tokio::io::duplex(256 * 1024);
    let client = Session::spawn(
        client_io,
        SessionRole::Client,
        config,
        metrics(),
        "client",
    );
    let server = Session::spawn(
        server_io,
        SessionRole::Server,
        config,
        metrics(),
        "server",
    );
    (client, server)
}

#[tokio::test]
async fn text_echo() {
    let config = LinkConfig::default();
    let ((client, mut client_events), (server, mut server_events)) = duplex_pair(&config);

    client.authenticate().await.unwrap();
    client.send(Packet::text("hello")).await.unwrap();

    let received = next_packet(&mut server_events).await;
    assert_eq!(received.kind, PacketKind::Message);
    assert_eq!(received.payload, [0x68, 0x65, 0x6c, 0x6c, 0x6f]);
    assert_eq!(received.content_length(), Some(5));

    // Echo it back
    server
        .send(Packet::text(received.text_payload().unwrap()))
        .await
        .unwrap();
    let echoed = next_packet(&mut client_events).await;
    assert_eq!(echoed.payload, b"hello");
}

#[tokio::test]
async fn encrypted_bytes_with_matching_keys() {
    let config = LinkConfig::default_with_overrides(|c| {
        c.transport.encryption_passphrase = Some("s3cret".into());
    });
    let ((client, _client_events), (_server, mut server_events)) = duplex_pair(&config);

    client.authenticate().await.unwrap();
    client
        .send(Packet::bytes(vec![0xDE, 0xAD, 0xBE, 0xEF]))
        .await
        .unwrap();

    let received = next_packet(&mut server_events).await;
    assert_eq!(received.payload, vec![0xDE, 0xAD, 0xBE, 0xEF]);
}

#[tokio::test]
async fn wrong_passphrase_drops_packet_but_session_continues() {
    use framelink::utils::crypto::preshared_digest_hex;
    use framelink::TransformContext;

    let server_config = LinkConfig::default_with_overrides(|c| {
        c.transport.encryption_passphrase = Some("s3cret".into());
        c.transport.preshared_key = Some("group".into());
    });

    let (session_io, mut raw_io) = tokio::io::duplex(64 * 1024);
    let (_server, mut server_events) = Session::spawn(
        session_io,
        SessionRole::Server,
        &server_config,
        metrics(),
        "server",
    );

    // Authenticate in the clear with the right digest
    let plain = TransformContext::plaintext(server_config.transport.limits.clone());
    let auth = Packet::auth(&preshared_digest_hex("group"), None).unwrap();
    raw_io.write_all(&plain.seal(auth).unwrap()).await.unwrap();

    loop {
        if let SessionEvent::Authenticated { .. } = server_events.recv().await.unwrap() {
            break;
        }
    }

    // A packet sealed under a different passphrase but the same group
    // secret passes the digest check and fails decryption
    let bad_ctx = TransformContext::new(&framelink::config::TransportConfig {
        encryption_passphrase: Some("wrong".into()),
        preshared_key: Some("group".into()),
        ..Default::default()
    });
    raw_io
        .write_all(&bad_ctx.seal(Packet::bytes(vec![1, 2, 3])).unwrap())
        .await
        .unwrap();

    match server_events.recv().await.unwrap() {
        SessionEvent::IntegrityFailure => {}
        other => panic!("unexpected event {other:?}"),
    }

    // The session survives and keeps delivering well-formed packets
    raw_io
        .write_all(&plain.seal(Packet::text("still alive")).unwrap())
        .await
        .unwrap();
    let packet = next_packet(&mut server_events).await;
    assert_eq!(packet.payload, b"still alive");
}

#[tokio::test]
async fn preshared_key_mismatch_closes_session() {
    let client_config = LinkConfig::default_with_overrides(|c| {
        c.transport.encryption_passphrase = Some("pass".into());
        c.transport.preshared_key = Some("wrong-group".into());
    });
    let server_config = LinkConfig::default_with_overrides(|c| {
        c.transport.encryption_passphrase = Some("pass".into());
        c.transport.preshared_key = Some("right-group".into());
    });

    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    let (client, _client_events) = Session::spawn(
        client_io,
        SessionRole::Client,
        &client_config,
        metrics(),
        "client",
    );
    let (server, mut server_events) = Session::spawn(
        server_io,
        SessionRole::Server,
        &server_config,
        metrics(),
        "server",
    );

    client.authenticate().await.unwrap();

    loop {
        match server_events.recv().await.unwrap() {
            SessionEvent::Closed(CloseReason::AuthRejected) => break,
            SessionEvent::IntegrityFailure => {}
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert_eq!(server.state(), SessionState::Closed);
}

#[tokio::test]
async fn fragmented_delivery_over_raw_stream() {
    // Hand-feed a sealed frame one byte at a time through the raw side of
    // the link; the session must emit exactly one packet.
    let config = LinkConfig::default();
    let (session_io, mut raw_io) = tokio::io::duplex(4 * 1024);
    let (_server, mut events) = Session::spawn(
        session_io,
        SessionRole::Server,
        &config,
        metrics(),
        "server",
    );

    let ctx = framelink::TransformContext::plaintext(config.transport.limits.clone());
    let bytes = ctx.seal(Packet::text("hello")).unwrap();

    for &b in &bytes {
        raw_io.write_all(&[b]).await.unwrap();
        raw_io.flush().await.unwrap();
    }

    let packet = next_packet(&mut events).await;
    assert_eq!(packet.payload, b"hello");

    // Nothing further queued
    tokio::select! {
        extra = events.recv() => {
            if let Some(event) = extra {
                panic!("unexpected trailing event {event:?}");
            }
        }
        _ = tokio::time::sleep(Duration::from_millis(100)) => {}
    }
}

#[tokio::test]
async fn directory_transfer_end_to_end() {
    let src = tempfile::tempdir().unwrap();
    std::fs::write(src.path().join("a.txt"), b"alpha").unwrap();
    std::fs::write(src.path().join("b.txt"), b"beta").unwrap();
    std::fs::create_dir(src.path().join("deep")).unwrap();
    std::fs::write(src.path().join("deep/c.dat"), vec![0x5A; 4096]).unwrap();

    let config = LinkConfig::default();
    let ((client, _client_events), (_server, mut server_events)) = duplex_pair(&config);

    client.authenticate().await.unwrap();
    let archive = pack_tree(src.path()).unwrap();
    client
        .send(Packet::directory("tree.tar.gz", archive).unwrap())
        .await
        .unwrap();

    let received = next_packet(&mut server_events).await;
    assert_eq!(received.kind, PacketKind::Directory);

    let dest = tempfile::tempdir().unwrap();
    unpack_tree(&received.payload, dest.path()).unwrap();
    assert_eq!(std::fs::read(dest.path().join("a.txt")).unwrap(), b"alpha");
    assert_eq!(std::fs::read(dest.path().join("b.txt")).unwrap(), b"beta");
    assert_eq!(
        std::fs::read(dest.path().join("deep/c.dat")).unwrap(),
        vec![0x5A; 4096]
    );
}

#[tokio::test]
async fn graceful_shutdown_rejects_new_sends() {
    let config = LinkConfig::default();
    let ((client, _client_events), _server) = duplex_pair(&config);

    client.authenticate().await.unwrap();
    client.send(Packet::text("before")).await.unwrap();

    client.shutdown().await;
    assert_eq!(client.state(), SessionState::Closed);
    assert!(matches!(
        client.send(Packet::text("after")).await,
        Err(WireError::Cancelled) | Err(WireError::NotConnected)
    ));
}

#[tokio::test]
async fn tcp_server_roundtrip() {
    let config = LinkConfig::default_with_overrides(|c| {
        c.server.address = "127.0.0.1:39571".into();
        c.client.address = "127.0.0.1:39571".into();
    });

    let server_metrics = metrics();
    let (incoming_tx, mut incoming_rx) = mpsc::channel(8);
    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    let server = tokio::spawn(tcp::start_server(
        config.clone(),
        server_metrics,
        incoming_tx,
        shutdown_rx,
    ));
    tokio::time::sleep(Duration::from_millis(100)).await;

    let (client, mut client_events) = tcp::connect(&config, metrics()).await.unwrap();
    assert!(client.is_ready());

    let mut incoming = incoming_rx.recv().await.unwrap();
    client.send(Packet::text("over tcp")).await.unwrap();
    let received = next_packet(&mut incoming.events).await;
    assert_eq!(received.payload, b"over tcp");

    incoming
        .session
        .send(Packet::response(b"ack".to_vec()))
        .await
        .unwrap();
    let response = next_packet(&mut client_events).await;
    assert_eq!(response.kind, PacketKind::Response);
    assert_eq!(response.payload, b"ack");

    client.shutdown().await;
    shutdown_tx.send(()).await.unwrap();
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn tls_roundtrip_with_self_signed_cert() {
    use tokio::net::{TcpListener, TcpStream};
    use tokio_rustls::{TlsAcceptor, TlsConnector};

    let dir = tempfile::tempdir().unwrap();
    let cert_path = dir.path().join("cert.pem");
    let key_path = dir.path().join("key.pem");
    let server_tls =
        tls::TlsServerConfig::generate_self_signed(&cert_path, &key_path).unwrap();
    let acceptor = TlsAcceptor::from(Arc::new(server_tls.load_server_config().unwrap()));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let config = LinkConfig::default();

    let server_config = config.clone();
    let server = tokio::spawn(async move {
        let (stream, peer) = listener.accept().await.unwrap();
        let tls_stream = acceptor.accept(stream).await.unwrap();
        let (_session, mut events) = Session::spawn(
            tls_stream,
            SessionRole::Server,
            &server_config,
            Arc::new(Metrics::new()),
            peer.to_string(),
        );
        next_packet(&mut events).await
    });

    let client_tls = tls::TlsClientConfig::new("localhost").insecure();
    let connector = TlsConnector::from(Arc::new(client_tls.load_client_config().unwrap()));
    let stream = TcpStream::connect(addr).await.unwrap();
    let tls_stream = connector
        .connect(client_tls.server_name().unwrap(), stream)
        .await
        .unwrap();

    let (client, _events) = Session::spawn(
        tls_stream,
        SessionRole::Client,
        &config,
        metrics(),
        addr.to_string(),
    );
    client.authenticate().await.unwrap();
    client.send(Packet::text("over tls")).await.unwrap();

    let received = server.await.unwrap();
    assert_eq!(received.payload, b"over tls");
}

#[tokio::test]
async fn partial_packets_arrive_in_order() {
    let config = LinkConfig::default();
    let ((client, _client_events), (_server, mut server_events)) = duplex_pair(&config);
    client.authenticate().await.unwrap();

    for index in 0..4u32 {
        let part = Packet::bytes(vec![index as u8; 16])
            .with_part("transfer-1", index, 4)
            .unwrap();
        client.send(part).await.unwrap();
    }

    for expected in 0..4u32 {
        let packet = next_packet(&mut server_events).await;
        let (id, index, total) = packet.part().unwrap();
        assert_eq!(id, "transfer-1");
        assert_eq!(index, expected);
        assert_eq!(total, 4);
    }
}
