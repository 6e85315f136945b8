use std::{future::Future, time::Duration};

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        protocol::{frame::coding::CloseCode, CloseFrame},
        Error as WsError, Message,
    },
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, trace};

use crate::error::TransportError;

use super::session::{SocketEvent, CLOSE_ABNORMAL};

/// An open socket connection.
///
/// After a `Close` event has been returned the transport is finished and is dropped by the
/// caller. An `Error` event is always eventually followed by `Close`.
pub trait SocketTransport: Send + 'static {
    /// Waits for the next event. Must be cancel safe.
    fn next_event(&mut self) -> impl Future<Output = SocketEvent> + Send;

    fn send_text(&mut self, text: String) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Starts the close handshake; the matching `Close` event arrives through `next_event`.
    fn close(
        &mut self,
        code: u16,
        reason: String,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// Opens [`SocketTransport`]s.
pub trait SocketConnector: Send + Sync + 'static {
    type Transport: SocketTransport;

    fn url(&self) -> &str;

    fn connect(&self) -> impl Future<Output = Result<Self::Transport, TransportError>> + Send;
}

/// Connector for `ws://` (and, with the `rustls` feature, `wss://`) endpoints.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
    connect_timeout: Option<Duration>,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: None,
        }
    }

    pub fn connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl SocketConnector for WsConnector {
    type Transport = WsTransport;

    fn url(&self) -> &str {
        &self.url
    }

    async fn connect(&self) -> Result<WsTransport, TransportError> {
        let handshake = connect_async(self.url.as_str());
        let (stream, response) = match self.connect_timeout {
            Some(timeout) => tokio::time::timeout(timeout, handshake)
                .await
                .map_err(|_| TransportError::Timeout {
                    url: self.url.clone(),
                    timeout,
                })??,
            None => handshake.await?,
        };
        debug!(url = %self.url, status = %response.status(), "websocket handshake complete");
        Ok(WsTransport::new(stream))
    }
}

/// [`SocketTransport`] over a `tokio-tungstenite` stream.
pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    close_frame: Option<(u16, String)>,
    failed: bool,
    finished: bool,
}

impl WsTransport {
    fn new(stream: WebSocketStream<MaybeTlsStream<TcpStream>>) -> Self {
        Self {
            stream,
            close_frame: None,
            failed: false,
            finished: false,
        }
    }

    fn close_event(&mut self) -> SocketEvent {
        self.finished = true;
        let (code, reason) = self
            .close_frame
            .take()
            .unwrap_or_else(|| (CLOSE_ABNORMAL, "connection lost".to_string()));
        SocketEvent::Close { code, reason }
    }
}

impl SocketTransport for WsTransport {
    async fn next_event(&mut self) -> SocketEvent {
        if self.failed || self.finished {
            return self.close_event();
        }
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return SocketEvent::Message(text.as_str().to_owned()),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => return SocketEvent::Message(text),
                    Err(_) => debug!(bytes = bytes.len(), "ignoring non-UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    // The peer's close frame wins over ours; the stream ends once the
                    // handshake completes.
                    let (code, reason) = match frame {
                        Some(frame) => (u16::from(frame.code), frame.reason.as_str().to_owned()),
                        None => (1005, String::new()),
                    };
                    debug!(code, reason = %reason, "close frame received");
                    self.close_frame = Some((code, reason));
                }
                Some(Ok(other)) => trace!(?other, "ignoring control frame"),
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) | None => {
                    return self.close_event();
                }
                Some(Err(err)) => {
                    self.failed = true;
                    return SocketEvent::Error(err.into());
                }
            }
        }
    }

    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.stream.send(Message::Text(text.into())).await?;
        Ok(())
    }

    async fn close(&mut self, code: u16, reason: String) -> Result<(), TransportError> {
        if self.close_frame.is_none() {
            self.close_frame = Some((code, reason.clone()));
        }
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.into(),
        };
        match self.stream.close(Some(frame)).await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
