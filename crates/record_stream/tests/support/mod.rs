#![allow(dead_code)]

use std::{
    collections::VecDeque,
    future::Future,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use futures_util::{SinkExt, StreamExt};
use record_stream::socket::{SocketConnector, SocketEvent, SocketTransport, CLOSE_ABNORMAL};
use record_stream::TransportError;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
    sync::mpsc,
    task::JoinHandle,
};
use tokio_tungstenite::tungstenite::Message;

/// Polls `condition` until it holds, failing the test after two seconds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub fn envelope(id: i64, name: &str) -> String {
    format!("{{\"result\":{{\"id\":{id},\"name\":\"{name}\"}}}}")
}

// Fake socket transport ------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct Wire {
    sent: Arc<Mutex<Vec<String>>>,
    closes: Arc<Mutex<Vec<(u16, String)>>>,
}

impl Wire {
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn closes(&self) -> Vec<(u16, String)> {
        self.closes.lock().unwrap().clone()
    }
}

/// Server side of a [`FakeTransport`].
pub struct FakePeer {
    events: mpsc::UnboundedSender<SocketEvent>,
    pub wire: Wire,
}

impl FakePeer {
    pub fn frame(&self, text: impl Into<String>) {
        let _ = self.events.send(SocketEvent::Message(text.into()));
    }

    pub fn error(&self, message: &str) {
        let _ = self
            .events
            .send(SocketEvent::Error(TransportError::Other(message.to_string())));
    }

    pub fn close(&self, code: u16, reason: &str) {
        let _ = self.events.send(SocketEvent::Close {
            code,
            reason: reason.to_string(),
        });
    }
}

pub struct FakeTransport {
    events: mpsc::UnboundedReceiver<SocketEvent>,
    echo: mpsc::UnboundedSender<SocketEvent>,
    wire: Wire,
    echo_close: bool,
    fail_sends: bool,
}

impl FakeTransport {
    /// Every `send_text` fails as if the socket had been reset.
    pub fn failing_sends(mut self) -> Self {
        self.fail_sends = true;
        self
    }
}

/// A connected transport/peer pair. The transport answers a close request with a matching
/// close event unless `echo_close` is false.
pub fn fake_connection(echo_close: bool) -> (FakeTransport, FakePeer) {
    let (tx, rx) = mpsc::unbounded_channel();
    let wire = Wire::default();
    (
        FakeTransport {
            events: rx,
            echo: tx.clone(),
            wire: wire.clone(),
            echo_close,
            fail_sends: false,
        },
        FakePeer { events: tx, wire },
    )
}

impl SocketTransport for FakeTransport {
    async fn next_event(&mut self) -> SocketEvent {
        self.events.recv().await.unwrap_or(SocketEvent::Close {
            code: CLOSE_ABNORMAL,
            reason: "connection lost".to_string(),
        })
    }

    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        if self.fail_sends {
            return Err(TransportError::Other("send failed: socket reset".to_string()));
        }
        self.wire.sent.lock().unwrap().push(text);
        Ok(())
    }

    async fn close(&mut self, code: u16, reason: String) -> Result<(), TransportError> {
        self.wire.closes.lock().unwrap().push((code, reason.clone()));
        if self.echo_close {
            let _ = self.echo.send(SocketEvent::Close { code, reason });
        }
        Ok(())
    }
}

pub enum ConnectPlan {
    Accept(FakeTransport),
    Refuse(String),
    Hang,
}

/// Connector that hands out planned outcomes in order and counts attempts.
#[derive(Clone, Default)]
pub struct FakeConnector {
    plans: Arc<Mutex<VecDeque<ConnectPlan>>>,
    attempts: Arc<AtomicUsize>,
}

impl FakeConnector {
    pub fn new(plans: impl IntoIterator<Item = ConnectPlan>) -> Self {
        Self {
            plans: Arc::new(Mutex::new(plans.into_iter().collect())),
            attempts: Arc::default(),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl SocketConnector for FakeConnector {
    type Transport = FakeTransport;

    fn url(&self) -> &str {
        "ws://fake.test/v1/users"
    }

    fn connect(&self) -> impl Future<Output = Result<FakeTransport, TransportError>> + Send {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let plan = self.plans.lock().unwrap().pop_front();
        async move {
            match plan {
                Some(ConnectPlan::Accept(transport)) => Ok(transport),
                Some(ConnectPlan::Refuse(message)) => Err(TransportError::Other(message)),
                Some(ConnectPlan::Hang) | None => std::future::pending().await,
            }
        }
    }
}

// Loopback servers ------------------------------------------------------------------------------

/// Serves one HTTP/1.1 response with a chunked body; each element of `chunks` is written as
/// its own chunk. Returns the base URL.
pub async fn serve_chunked(status: u16, chunks: Vec<Vec<u8>>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                return;
            }
            request.extend_from_slice(&buf[..n]);
        }

        let head = format!(
            "HTTP/1.1 {status} Status\r\nContent-Type: application/x-ndjson\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n"
        );
        if socket.write_all(head.as_bytes()).await.is_err() {
            return;
        }
        for chunk in chunks {
            let mut framed = format!("{:x}\r\n", chunk.len()).into_bytes();
            framed.extend_from_slice(&chunk);
            framed.extend_from_slice(b"\r\n");
            if socket.write_all(&framed).await.is_err() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let _ = socket.write_all(b"0\r\n\r\n").await;
        let _ = socket.shutdown().await;
    });

    format!("http://{addr}/v1/users")
}

/// Accepts one WebSocket client, waits for its first message, answers with `frames` and then
/// reads until the client closes. The task yields every text message the client sent.
pub async fn serve_websocket(frames: Vec<String>) -> (String, JoinHandle<Vec<String>>) {
    serve_websocket_messages(frames.into_iter().map(|f| Message::Text(f.into())).collect()).await
}

/// Like [`serve_websocket`], with arbitrary frame types.
pub async fn serve_websocket_messages(
    frames: Vec<Message>,
) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let task = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();
        let mut received = Vec::new();

        if let Some(Ok(Message::Text(text))) = ws.next().await {
            received.push(text.as_str().to_owned());
        }
        for frame in frames {
            ws.send(frame).await.unwrap();
        }
        while let Some(message) = ws.next().await {
            match message {
                Ok(Message::Text(text)) => received.push(text.as_str().to_owned()),
                Ok(_) => {}
                Err(_) => break,
            }
        }
        received
    });

    (format!("ws://{addr}/v1/users"), task)
}
