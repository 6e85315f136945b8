use ndjson_ingest::{LineDecoder, LineIngestor};
use tracing::{debug, info, warn};

use crate::config::{FrameMode, SocketOptions};
use crate::error::{StreamError, TransportError};
use crate::observer::{deliver, LogEntry, Severity, StreamObserver, StreamSummary};

use super::state::{ConnectionState, Transition};

/// Normal closure.
pub const CLOSE_NORMAL: u16 = 1000;
/// Connection dropped without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Something the transport reported.
#[derive(Debug)]
pub enum SocketEvent {
    Open,
    Message(String),
    Error(TransportError),
    Close { code: u16, reason: String },
}

/// Something the session needs the transport to do.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum SocketCommand {
    Send(String),
    Close { code: u16, reason: String },
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ConnectDecision {
    /// The caller should open the transport.
    Open,
    /// Ignored; a connection is already in progress or established.
    AlreadyActive(ConnectionState),
}

/// Socket pipeline logic without any I/O.
///
/// The session owns the connection state, the ingestion buffers and the observer of one
/// client. A driver feeds it transport events and executes the commands it returns; every
/// event is handled to completion before the next one is accepted.
pub struct SocketSession<D: LineDecoder, O> {
    state: ConnectionState,
    ingest: LineIngestor<D>,
    observer: O,
    options: SocketOptions,
    summary: StreamSummary,
}

impl<D, O> SocketSession<D, O>
where
    D: LineDecoder,
    O: StreamObserver<D::Record>,
{
    pub fn new(decoder: D, observer: O, options: SocketOptions) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            ingest: LineIngestor::new(decoder, options.ingest),
            observer,
            options,
            summary: StreamSummary::default(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Totals across every connection made by this session.
    pub fn summary(&self) -> StreamSummary {
        self.summary
    }

    pub fn options(&self) -> &SocketOptions {
        &self.options
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn observer_mut(&mut self) -> &mut O {
        &mut self.observer
    }

    pub fn into_observer(self) -> O {
        self.observer
    }

    /// Asks to open a connection to `url`.
    pub fn request_connect(&mut self, url: &str) -> ConnectDecision {
        if self.state.is_active() {
            info!(state = %self.state, "connect ignored; connection already active");
            self.diagnostic(Severity::Info, "Already connected!");
            return ConnectDecision::AlreadyActive(self.state);
        }

        self.summary.cancelled = false;
        self.ingest.reset();
        self.transition(Transition::ConnectRequested);
        self.diagnostic(Severity::Info, format!("Connecting to {url}..."));
        ConnectDecision::Open
    }

    /// Asks to close the connection. The state changes only when the close event arrives.
    pub fn request_disconnect(&mut self) -> Option<SocketCommand> {
        if !self.state.is_active() {
            debug!("disconnect ignored; not connected");
            self.diagnostic(Severity::Info, "Not connected");
            return None;
        }

        self.summary.cancelled = true;
        self.diagnostic(Severity::Info, "Disconnecting...");
        Some(SocketCommand::Close {
            code: CLOSE_NORMAL,
            reason: self.options.close_reason.clone(),
        })
    }

    /// Applies one transport event and returns the commands it calls for.
    pub fn handle_event(&mut self, event: SocketEvent) -> Vec<SocketCommand> {
        match event {
            SocketEvent::Open => self.on_open(),
            SocketEvent::Message(text) => {
                self.on_message(&text);
                Vec::new()
            }
            SocketEvent::Error(err) => {
                self.report_error(StreamError::Transport(err));
                Vec::new()
            }
            SocketEvent::Close { code, reason } => {
                self.on_close(code, &reason);
                Vec::new()
            }
        }
    }

    /// Reports a failure that does not by itself change the connection state.
    pub fn report_error(&mut self, err: StreamError) {
        warn!(state = %self.state, error = %err, "socket stream error");
        self.diagnostic(Severity::Error, format!("WebSocket error: {err}"));
        self.observer.on_error(&err);
    }

    /// Records that the driver carried out `command`.
    pub fn command_completed(&mut self, command: &SocketCommand) {
        match command {
            SocketCommand::Send(payload) => {
                debug!(bytes = payload.len(), "sent payload");
                self.diagnostic(Severity::Info, "Sent initial request");
            }
            SocketCommand::Close { code, .. } => {
                debug!(code, "close initiated");
            }
        }
    }

    /// Records that the driver failed to carry out `command`.
    pub fn command_failed(&mut self, command: &SocketCommand, err: TransportError) {
        match command {
            SocketCommand::Send(_) => debug!("failed to send payload"),
            SocketCommand::Close { code, .. } => debug!(code, "failed to initiate close"),
        }
        self.report_error(StreamError::Transport(err));
    }

    fn on_open(&mut self) -> Vec<SocketCommand> {
        if self.state != ConnectionState::Connecting {
            warn!(state = %self.state, "ignoring open event");
            return Vec::new();
        }
        self.transition(Transition::Opened);
        self.diagnostic(Severity::Success, "Connected to WebSocket");

        match &self.options.trigger_payload {
            Some(payload) => vec![SocketCommand::Send(payload.clone())],
            None => Vec::new(),
        }
    }

    fn on_message(&mut self, text: &str) {
        if self.state != ConnectionState::Connected {
            warn!(
                state = %self.state,
                bytes = text.len(),
                "dropping frame received while not connected"
            );
            return;
        }
        self.diagnostic(Severity::Data, format!("Received: {text}"));

        let mut lines = self.ingest.push_text(text);
        if self.options.framing == FrameMode::FrameIsComplete {
            lines.extend(self.ingest.end_frame());
        }
        for line in lines {
            deliver(&mut self.observer, &mut self.summary, line);
        }
    }

    fn on_close(&mut self, code: u16, reason: &str) {
        let pending = self.ingest.pending_bytes();
        if pending > 0 {
            debug!(bytes = pending, "dropping partial line on close");
        }
        self.ingest.reset();

        let severity = if code == CLOSE_NORMAL {
            Severity::Info
        } else {
            Severity::Error
        };
        self.diagnostic(severity, format!("Disconnected: {code} {reason}"));
        self.transition(Transition::Closed);
    }

    fn transition(&mut self, transition: Transition) {
        let from = self.state;
        match from.apply(transition) {
            Ok(to) if to != from => {
                info!(%from, %to, "connection state changed");
                self.state = to;
                self.observer.on_state_change(from, to);
            }
            Ok(_) => {}
            Err(err) => warn!(error = %err, "ignoring illegal transition"),
        }
    }

    fn diagnostic(&mut self, severity: Severity, message: impl Into<String>) {
        self.observer.on_diagnostic(LogEntry::new(severity, message));
    }
}
