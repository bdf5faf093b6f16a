//! End-to-end exercises of `Connection` against a minimal in-process mock broker, per
//! the concrete scenarios of §8: metadata-driven routing, a malformed (too-short)
//! response frame, and exhausting the retry budget against unreachable brokers.

use std::io::Cursor;
use std::time::Duration;

use assert_matches::assert_matches;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use brokerlog_client::connection::{Connection, ConnectionConfig, Request, RequiredAcks, Response};
use brokerlog_client::error::ErrorCode;
use brokerlog_client::io::IpVersion;
use brokerlog_client::protocol::api_key::ApiKey;
use brokerlog_client::protocol::api_version::ApiVersion;
use brokerlog_client::protocol::messages::{ReadVersionedType, RequestHeader, ResponseHeader, WriteVersionedType};
use brokerlog_client::protocol::primitives::write_array;
use brokerlog_client::protocol::record::{Message, MessageSet};
use brokerlog_client::protocol::traits::WriteType;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn config(timeout_ms: u64, send_max_attempts: u32) -> ConnectionConfig {
    ConnectionConfig {
        timeout: Duration::from_millis(timeout_ms),
        send_max_attempts,
        retry_backoff: Duration::from_millis(1),
        ip_version: IpVersion::V4,
        raise_error: true,
        dont_load_supported_api_versions: true,
        client_id: Some("test-client".to_string()),
    }
}

/// Frames `correlation_id` plus a response header and `body` exactly as
/// `Connection::call` expects to read it back.
fn frame_response(correlation_id: i32, body: &[u8]) -> Vec<u8> {
    let header = ResponseHeader { correlation_id };
    let mut payload = Vec::new();
    header.write_versioned(&mut payload, ApiVersion(0)).unwrap();
    payload.extend_from_slice(body);

    let mut framed = Vec::with_capacity(payload.len() + 4);
    (payload.len() as i32).write(&mut framed).unwrap();
    framed.extend_from_slice(&payload);
    framed
}

/// Hand-rolls the `MetadataResponse` wire layout directly (there's no
/// `WriteVersionedType` impl for response bodies — only a real broker ever produces
/// one), matching the field order `MetadataResponse::read_versioned` expects.
fn metadata_response_body(broker_port: u16) -> Vec<u8> {
    let mut buf = Vec::new();
    1i32.write(&mut buf).unwrap(); // brokers: one entry
    1i32.write(&mut buf).unwrap(); // node_id
    "127.0.0.1".to_string().write(&mut buf).unwrap();
    (broker_port as i32).write(&mut buf).unwrap();
    1i32.write(&mut buf).unwrap(); // topics: one entry
    0i16.write(&mut buf).unwrap(); // no topic error
    "test-topic".to_string().write(&mut buf).unwrap();
    1i32.write(&mut buf).unwrap(); // partitions: one entry
    0i16.write(&mut buf).unwrap(); // no partition error
    0i32.write(&mut buf).unwrap(); // partition_index
    1i32.write(&mut buf).unwrap(); // leader_id
    write_array(&mut buf, &[1i32]).unwrap(); // replica_nodes
    write_array(&mut buf, &[1i32]).unwrap(); // isr_nodes
    buf
}

/// Hand-rolls the `ProduceResponse` wire layout, same reasoning as
/// `metadata_response_body`.
fn produce_response_body(base_offset: i64) -> Vec<u8> {
    let mut buf = Vec::new();
    1i32.write(&mut buf).unwrap(); // topics: one entry
    "test-topic".to_string().write(&mut buf).unwrap();
    1i32.write(&mut buf).unwrap(); // partitions: one entry
    0i32.write(&mut buf).unwrap(); // partition_index
    0i16.write(&mut buf).unwrap(); // no error
    base_offset.write(&mut buf).unwrap();
    buf
}

/// Answers Metadata requests with a single-broker, single-partition cluster pointing
/// back at its own listening port, Produce requests with a fixed offset, and anything
/// else (used to simulate a malformed reply) with a bare 4-byte `0` length frame.
#[tokio::test]
async fn metadata_routes_produce_to_the_reported_leader() {
    init_tracing();

    let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let broker = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        loop {
            let (correlation_id, api_key, _body) = match read_request_or_eof(&mut socket).await {
                Some(r) => r,
                None => break,
            };
            let response = match api_key {
                ApiKey::Metadata => frame_response(correlation_id, &metadata_response_body(port)),
                ApiKey::Produce => frame_response(correlation_id, &produce_response_body(42)),
                other => panic!("unexpected request in this scenario: {other:?}"),
            };
            socket.write_all(&response).await.unwrap();
        }
    });

    let mut conn = Connection::new(
        vec![("127.0.0.1".to_string(), port)],
        config(1000, 2),
    )
    .unwrap();

    conn.get_metadata(None).await.unwrap();
    assert!(conn.exists_topic_partition("test-topic", 0));

    let records = MessageSet::from_messages(vec![(0, Message::new(b"hello".to_vec()))]);
    let offset = conn
        .produce(
            "test-topic",
            0,
            records,
            RequiredAcks::WaitLocalLog,
            1000,
        )
        .await
        .unwrap();
    assert_eq!(offset, Some(42));

    conn.close().await;
    drop(conn);
    broker.abort();
}

/// §4.5's single dispatch verb: `receive_response_to_request` routes a `Request::Metadata`
/// and a `Request::Produce` through the same metadata-refresh-then-route path as the
/// typed `get_metadata`/`produce` methods, and hands back the matching `Response` variant.
#[tokio::test]
async fn receive_response_to_request_dispatches_metadata_and_produce() {
    init_tracing();

    let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let broker = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        loop {
            let (correlation_id, api_key, _body) = match read_request_or_eof(&mut socket).await {
                Some(r) => r,
                None => break,
            };
            let response = match api_key {
                ApiKey::Metadata => frame_response(correlation_id, &metadata_response_body(port)),
                ApiKey::Produce => frame_response(correlation_id, &produce_response_body(7)),
                other => panic!("unexpected request in this scenario: {other:?}"),
            };
            socket.write_all(&response).await.unwrap();
        }
    });

    let mut conn = Connection::new(vec![("127.0.0.1".to_string(), port)], config(1000, 2)).unwrap();

    let resp = conn
        .receive_response_to_request(Request::Metadata { topic: None })
        .await
        .unwrap();
    assert_matches!(resp, Response::Metadata);

    let records = MessageSet::from_messages(vec![(0, Message::new(b"hi".to_vec()))]);
    let resp = conn
        .receive_response_to_request(Request::Produce {
            topic: "test-topic".to_string(),
            partition: 0,
            records,
            required_acks: RequiredAcks::WaitLocalLog,
            timeout_ms: 1000,
        })
        .await
        .unwrap();
    assert_matches!(resp, Response::Produce(Some(7)));

    conn.close().await;
    drop(conn);
    broker.abort();
}

/// A `Produce` issued with `RequiredAcks::NoResponse` never waits on a reply (§8
/// scenario 5): the mock broker here never writes anything back, and the call still
/// returns promptly with `Ok(None)`.
#[tokio::test]
async fn produce_with_no_response_acks_does_not_wait_for_a_reply() {
    init_tracing();

    let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let broker = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let (correlation_id, api_key, _) = read_request_or_eof(&mut socket).await.unwrap();
        assert_eq!(api_key, ApiKey::Metadata);
        socket
            .write_all(&frame_response(correlation_id, &metadata_response_body(port)))
            .await
            .unwrap();

        // The producer's next request never gets a reply; confirm it arrived at all.
        let (_correlation_id, api_key, _) = read_request_or_eof(&mut socket).await.unwrap();
        assert_eq!(api_key, ApiKey::Produce);
    });

    let mut conn = Connection::new(
        vec![("127.0.0.1".to_string(), port)],
        config(1000, 2),
    )
    .unwrap();

    conn.get_metadata(None).await.unwrap();

    let records = MessageSet::from_messages(vec![(0, Message::new(b"fire-and-forget".to_vec()))]);
    let result = tokio::time::timeout(
        Duration::from_millis(500),
        conn.produce("test-topic", 0, records, RequiredAcks::NoResponse, 1000),
    )
    .await
    .expect("produce with NoResponse must not block waiting for a reply")
    .unwrap();

    assert_eq!(result, None);

    broker.await.unwrap();
}

/// §8 scenario 7: a response whose declared length is too short to contain a real
/// message is `ResponseMessageNotReceived`, surfaced directly (not wrapped) through the
/// per-partition call path.
#[tokio::test]
async fn truncated_response_length_is_response_message_not_received() {
    init_tracing();

    let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let broker = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();

        let (correlation_id, api_key, _) = read_request_or_eof(&mut socket).await.unwrap();
        assert_eq!(api_key, ApiKey::Metadata);
        socket
            .write_all(&frame_response(correlation_id, &metadata_response_body(port)))
            .await
            .unwrap();

        let (_correlation_id, api_key, _) = read_request_or_eof(&mut socket).await.unwrap();
        assert_eq!(api_key, ApiKey::Fetch);
        // A declared response length of 0 (< 4): too short to contain even the
        // correlation id.
        socket.write_all(&0i32.to_be_bytes()).await.unwrap();
    });

    let mut conn = Connection::new(
        vec![("127.0.0.1".to_string(), port)],
        config(1000, 1),
    )
    .unwrap();

    conn.get_metadata(None).await.unwrap();

    let err = conn
        .fetch(
            "test-topic",
            0,
            0,
            100,
            brokerlog_client::connection::MinBytes::Immediate,
            1024,
        )
        .await
        .unwrap_err();

    assert_matches!(err.code(), ErrorCode::ResponseMessageNotReceived);

    broker.await.unwrap();
}

/// §8 scenario 6: when every known broker is unreachable, `get_metadata` exhausts its
/// attempts and `cluster_errors()` names every known server.
#[tokio::test]
async fn metadata_refresh_against_unreachable_brokers_records_every_server() {
    init_tracing();

    // Bind two listeners just to claim free ports, then drop them so nothing answers.
    let l1 = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let port1 = l1.local_addr().unwrap().port();
    let l2 = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let port2 = l2.local_addr().unwrap().port();
    drop(l1);
    drop(l2);

    let mut conn = Connection::new(
        vec![
            ("127.0.0.1".to_string(), port1),
            ("127.0.0.1".to_string(), port2),
        ],
        config(200, 1),
    )
    .unwrap();

    let err = conn.get_metadata(None).await.unwrap_err();
    assert_matches!(err.code(), ErrorCode::MetadataAttemptsFail);
    assert_eq!(conn.cluster_errors().len(), 2);
    // §4.4: the recorded failure keeps its real kind rather than flattening to
    // `DescriptionMismatch` (a connection refusal is `CannotBind`).
    for recorded in conn.cluster_errors().values() {
        assert_matches!(recorded.code(), ErrorCode::CannotBind);
    }
}

/// §4.5: `cluster_errors()` only names servers with a non-empty last error *since the
/// last successful op against that server* — a server that fails and later succeeds
/// must drop out of the map.
#[tokio::test]
async fn cluster_errors_clears_after_a_later_success() {
    init_tracing();

    let probe = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let port = probe.local_addr().unwrap().port();
    drop(probe);

    let mut conn =
        Connection::new(vec![("127.0.0.1".to_string(), port)], config(200, 1)).unwrap();

    let err = conn.get_metadata(None).await.unwrap_err();
    assert_matches!(err.code(), ErrorCode::MetadataAttemptsFail);
    assert_eq!(conn.cluster_errors().len(), 1);

    let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
    let broker = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let (correlation_id, api_key, _) = read_request_or_eof(&mut socket).await.unwrap();
        assert_eq!(api_key, ApiKey::Metadata);
        socket
            .write_all(&frame_response(correlation_id, &metadata_response_body(port)))
            .await
            .unwrap();
    });

    conn.get_metadata(None).await.unwrap();
    assert!(conn.cluster_errors().is_empty());

    broker.await.unwrap();
}

async fn read_request_or_eof(socket: &mut TcpStream) -> Option<(i32, ApiKey, Vec<u8>)> {
    let mut len_buf = [0u8; 4];
    match socket.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return None,
        Err(e) => panic!("unexpected read error: {e}"),
    }
    let len = i32::from_be_bytes(len_buf) as usize;

    let mut body = vec![0u8; len];
    socket.read_exact(&mut body).await.unwrap();

    let mut cursor = Cursor::new(&body);
    // Every request this crate sends frames its header at version 1 (carries
    // `client_id`, per §4.2's mandatory base framing), regardless of the body's own
    // api-version.
    let header = RequestHeader::read_versioned(&mut cursor, ApiVersion(1)).unwrap();
    let rest = body[cursor.position() as usize..].to_vec();
    Some((header.correlation_id, header.request_api_key, rest))
}
