mod support;

use std::time::Duration;

use record_stream::{
    socket::CLOSE_ABNORMAL, ConnectionState, EnvelopeDecoder, FrameMode, Record, SharedCollector,
    SocketOptions, SocketStreamClient, StreamConfig,
};
use support::{envelope, eventually, fake_connection, ConnectPlan, FakeConnector};
use tokio_tungstenite::tungstenite::Message;

use ConnectionState::*;

fn spawn(
    connector: FakeConnector,
    collector: &SharedCollector<Record>,
    options: SocketOptions,
) -> SocketStreamClient {
    SocketStreamClient::spawn(
        connector,
        EnvelopeDecoder::new(),
        collector.clone(),
        options,
    )
}

fn states(collector: &SharedCollector<Record>) -> Vec<ConnectionState> {
    collector.with(|c| c.states.clone())
}

fn names(collector: &SharedCollector<Record>) -> Vec<String> {
    collector.with(|c| c.records.iter().map(|r| r.name.clone()).collect())
}

#[tokio::test]
async fn open_stream_and_close_normally() {
    let (transport, peer) = fake_connection(true);
    let connector = FakeConnector::new([ConnectPlan::Accept(transport)]);
    let collector = SharedCollector::new();
    let client = spawn(connector.clone(), &collector, SocketOptions::default());

    assert_eq!(client.state(), Disconnected);
    client.connect().unwrap();
    client.wait_for_state(Connected).await.unwrap();
    eventually(|| peer.wire.sent() == vec!["{}".to_string()]).await;

    peer.frame(format!("{}\n{}", envelope(1, "Alice"), envelope(2, "Bob")));
    eventually(|| collector.with(|c| c.records.len()) == 2).await;
    assert_eq!(names(&collector), vec!["Alice", "Bob"]);

    client.disconnect().unwrap();
    client.wait_for_state(Disconnected).await.unwrap();
    assert_eq!(
        peer.wire.closes(),
        vec![(1000, "Client closing connection".to_string())]
    );
    assert_eq!(states(&collector), vec![Connecting, Connected, Disconnected]);

    let summary = client.shutdown().await.unwrap();
    assert_eq!(summary.records, 2);
    assert!(summary.cancelled);
    assert_eq!(connector.attempts(), 1);
}

#[tokio::test]
async fn second_connect_while_connected_opens_nothing() {
    let (transport, _peer) = fake_connection(true);
    let connector = FakeConnector::new([ConnectPlan::Accept(transport)]);
    let collector = SharedCollector::new();
    let client = spawn(connector.clone(), &collector, SocketOptions::default());

    client.connect().unwrap();
    client.wait_for_state(Connected).await.unwrap();
    client.connect().unwrap();
    eventually(|| {
        collector.with(|c| c.log.entries().any(|e| e.message == "Already connected!"))
    })
    .await;

    assert_eq!(connector.attempts(), 1);
    assert_eq!(states(&collector), vec![Connecting, Connected]);
    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn refused_connection_reports_error_and_settles() {
    let connector = FakeConnector::new([ConnectPlan::Refuse("connection refused".to_string())]);
    let collector = SharedCollector::new();
    let client = spawn(connector, &collector, SocketOptions::default());

    client.connect().unwrap();
    eventually(|| states(&collector) == vec![Connecting, Disconnected]).await;

    assert_eq!(client.state(), Disconnected);
    collector.with(|c| {
        assert_eq!(c.failures.len(), 1);
        assert!(c.failures[0].contains("connection refused"));
        assert!(c
            .log
            .entries()
            .any(|e| e.message.starts_with(&format!("Disconnected: {CLOSE_ABNORMAL}"))));
    });
    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn disconnect_while_connecting_abandons_the_attempt() {
    let connector = FakeConnector::new([ConnectPlan::Hang]);
    let collector = SharedCollector::new();
    let client = spawn(connector, &collector, SocketOptions::default());

    client.connect().unwrap();
    eventually(|| states(&collector) == vec![Connecting]).await;
    client.disconnect().unwrap();
    eventually(|| states(&collector) == vec![Connecting, Disconnected]).await;

    assert!(collector.with(|c| c.failures.is_empty()));
    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn transport_error_waits_for_close_event() {
    let (transport, peer) = fake_connection(true);
    let connector = FakeConnector::new([ConnectPlan::Accept(transport)]);
    let collector = SharedCollector::new();
    let client = spawn(connector, &collector, SocketOptions::default());

    client.connect().unwrap();
    client.wait_for_state(Connected).await.unwrap();

    peer.error("reset by peer");
    eventually(|| collector.with(|c| c.failures.len()) == 1).await;
    assert_eq!(client.state(), Connected);

    peer.close(CLOSE_ABNORMAL, "");
    client.wait_for_state(Disconnected).await.unwrap();
    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn reconnect_starts_with_a_clean_buffer() {
    let (first, first_peer) = fake_connection(true);
    let (second, second_peer) = fake_connection(true);
    let connector = FakeConnector::new([ConnectPlan::Accept(first), ConnectPlan::Accept(second)]);
    let collector = SharedCollector::new();
    let options = SocketOptions {
        framing: FrameMode::Continuous,
        trigger_payload: None,
        ..SocketOptions::default()
    };
    let client = spawn(connector, &collector, options);

    client.connect().unwrap();
    client.wait_for_state(Connected).await.unwrap();
    first_peer.frame("{\"result\":{\"id\":1,\"na");
    first_peer.close(1001, "going away");
    client.wait_for_state(Disconnected).await.unwrap();

    client.connect().unwrap();
    eventually(|| states(&collector).len() == 5).await;
    second_peer.frame(format!("{}\n", envelope(2, "Bob")));
    eventually(|| collector.with(|c| c.records.len()) == 1).await;

    assert_eq!(names(&collector), vec!["Bob"]);
    assert!(collector.with(|c| c.line_errors.is_empty()));
    assert!(second_peer.wire.sent().is_empty());
    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn idle_connection_is_reported_and_closed() {
    let (transport, peer) = fake_connection(true);
    let connector = FakeConnector::new([ConnectPlan::Accept(transport)]);
    let collector = SharedCollector::new();
    let options = SocketOptions {
        idle_timeout: Some(Duration::from_millis(50)),
        ..SocketOptions::default()
    };
    let client = spawn(connector, &collector, options);

    client.connect().unwrap();
    eventually(|| states(&collector) == vec![Connecting, Connected, Disconnected]).await;

    collector.with(|c| {
        assert_eq!(c.failures.len(), 1);
        assert!(c.failures[0].contains("idle"), "{:?}", c.failures);
    });
    assert_eq!(peer.wire.closes()[0].0, 1000);
    client.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn control_requests_do_not_extend_the_idle_window() {
    let (transport, peer) = fake_connection(true);
    let connector = FakeConnector::new([ConnectPlan::Accept(transport)]);
    let collector = SharedCollector::new();
    let options = SocketOptions {
        idle_timeout: Some(Duration::from_millis(100)),
        ..SocketOptions::default()
    };
    let client = spawn(connector.clone(), &collector, options);

    client.connect().unwrap();
    client.wait_for_state(Connected).await.unwrap();
    for _ in 0..10 {
        tokio::time::sleep(Duration::from_millis(60)).await;
        if client.state() == Disconnected {
            break;
        }
        client.connect().unwrap();
    }

    assert_eq!(client.state(), Disconnected);
    collector.with(|c| {
        assert_eq!(c.failures.len(), 1);
        assert!(c.failures[0].contains("idle"), "{:?}", c.failures);
    });
    assert_eq!(peer.wire.closes().len(), 1);
    assert_eq!(connector.attempts(), 1);
    client.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn unanswered_close_settles_as_abnormal() {
    let (transport, peer) = fake_connection(false);
    let connector = FakeConnector::new([ConnectPlan::Accept(transport)]);
    let collector = SharedCollector::new();
    let client = spawn(connector, &collector, SocketOptions::default());

    client.connect().unwrap();
    client.wait_for_state(Connected).await.unwrap();
    let started = tokio::time::Instant::now();
    client.disconnect().unwrap();
    client.wait_for_state(Disconnected).await.unwrap();

    assert!(started.elapsed() >= Duration::from_secs(5));
    assert_eq!(peer.wire.closes().len(), 1);
    assert!(collector.with(|c| c
        .log
        .entries()
        .any(|e| e.message == format!("Disconnected: {CLOSE_ABNORMAL} close handshake timed out"))));
    assert_eq!(states(&collector), vec![Connecting, Connected, Disconnected]);
    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn failed_trigger_send_is_reported_without_leaving_connected() {
    let (transport, peer) = fake_connection(true);
    let connector = FakeConnector::new([ConnectPlan::Accept(transport.failing_sends())]);
    let collector = SharedCollector::new();
    let client = spawn(connector, &collector, SocketOptions::default());

    client.connect().unwrap();
    client.wait_for_state(Connected).await.unwrap();
    eventually(|| collector.with(|c| c.failures.len()) == 1).await;

    assert_eq!(client.state(), Connected);
    assert!(peer.wire.sent().is_empty());
    collector.with(|c| assert!(c.failures[0].contains("socket reset"), "{:?}", c.failures));

    peer.frame(envelope(1, "Alice"));
    eventually(|| collector.with(|c| c.records.len()) == 1).await;
    assert_eq!(states(&collector), vec![Connecting, Connected]);
    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn shutdown_closes_an_open_connection() {
    let (transport, peer) = fake_connection(true);
    let connector = FakeConnector::new([ConnectPlan::Accept(transport)]);
    let collector = SharedCollector::new();
    let client = spawn(connector, &collector, SocketOptions::default());

    client.connect().unwrap();
    client.wait_for_state(Connected).await.unwrap();
    let summary = client.shutdown().await.unwrap();

    assert_eq!(summary.records, 0);
    assert_eq!(peer.wire.closes().len(), 1);
    assert_eq!(states(&collector), vec![Connecting, Connected, Disconnected]);
}

#[tokio::test]
async fn websocket_transport_streams_records_from_a_live_server() {
    let (url, server) = support::serve_websocket(vec![
        envelope(1, "Alice"),
        format!("{}\n{}\n", envelope(2, "Bob"), envelope(3, "Carol")),
        "not json".to_string(),
    ])
    .await;

    let config = StreamConfig {
        socket_url: url,
        connect_timeout_ms: Some(2_000),
        ..StreamConfig::default()
    };
    let collector = SharedCollector::new();
    let client = SocketStreamClient::websocket(&config, collector.clone());

    client.connect().unwrap();
    client.wait_for_state(Connected).await.unwrap();
    eventually(|| collector.with(|c| c.records.len() == 3 && c.line_errors.len() == 1)).await;
    assert_eq!(names(&collector), vec!["Alice", "Bob", "Carol"]);

    client.disconnect().unwrap();
    client.wait_for_state(Disconnected).await.unwrap();
    let summary = client.shutdown().await.unwrap();
    assert_eq!(summary.records, 3);
    assert_eq!(summary.line_errors, 1);

    let received = server.await.unwrap();
    assert_eq!(received, vec!["{}".to_string()]);
    assert!(collector.with(|c| c
        .log
        .entries()
        .any(|e| e.message == "Disconnected: 1000 Client closing connection")));
}

#[tokio::test]
async fn utf8_binary_frames_are_decoded_like_text() {
    let (url, server) = support::serve_websocket_messages(vec![
        Message::Binary(format!("{}\n", envelope(1, "Zoë")).into_bytes().into()),
        Message::Binary(vec![0xff, 0xfe, b'\n'].into()),
        Message::Text(envelope(2, "Bob").into()),
    ])
    .await;

    let config = StreamConfig {
        socket_url: url,
        connect_timeout_ms: Some(2_000),
        ..StreamConfig::default()
    };
    let collector = SharedCollector::new();
    let client = SocketStreamClient::websocket(&config, collector.clone());

    client.connect().unwrap();
    eventually(|| collector.with(|c| c.records.len()) == 2).await;
    assert_eq!(names(&collector), vec!["Zoë", "Bob"]);

    client.disconnect().unwrap();
    client.wait_for_state(Disconnected).await.unwrap();
    client.shutdown().await.unwrap();
    server.await.unwrap();
}
