use std::time::Duration;

use ndjson_ingest::{EnvelopeDecoder, LineDecoder, Record};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::Instant,
};
use tracing::{debug, info, warn};

use crate::config::{SocketOptions, StreamConfig};
use crate::error::StreamError;
use crate::observer::{StreamObserver, StreamSummary};

use super::session::{
    ConnectDecision, SocketCommand, SocketEvent, SocketSession, CLOSE_ABNORMAL, CLOSE_NORMAL,
};
use super::state::ConnectionState;
use super::transport::{SocketConnector, SocketTransport, WsConnector};

/// How long a close handshake may take before the connection is considered dropped.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug)]
enum Control {
    Connect,
    Disconnect,
    Shutdown,
}

/// Handle to a socket stream pipeline running on its own task.
///
/// `connect` and `disconnect` only enqueue a request; observe the outcome through
/// [`SocketStreamClient::subscribe_state`], [`SocketStreamClient::wait_for_state`] or the
/// observer's `on_state_change`.
pub struct SocketStreamClient {
    control: mpsc::UnboundedSender<Control>,
    state: watch::Receiver<ConnectionState>,
    task: JoinHandle<StreamSummary>,
}

impl SocketStreamClient {
    /// Spawns the driver task. Must be called within a Tokio runtime.
    pub fn spawn<C, D, O>(connector: C, decoder: D, observer: O, options: SocketOptions) -> Self
    where
        C: SocketConnector,
        D: LineDecoder + Send + 'static,
        D::Record: Send + 'static,
        O: StreamObserver<D::Record> + Send + 'static,
    {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let driver = Driver {
            connector,
            session: SocketSession::new(decoder, observer, options),
            control: control_rx,
            state: state_tx,
        };
        Self {
            control: control_tx,
            state: state_rx,
            task: tokio::spawn(driver.run()),
        }
    }

    /// WebSocket client decoding [`Record`]s, configured from `config`.
    pub fn websocket<O>(config: &StreamConfig, observer: O) -> Self
    where
        O: StreamObserver<Record> + Send + 'static,
    {
        let connector =
            WsConnector::new(config.socket_url.clone()).connect_timeout(config.connect_timeout());
        Self::spawn(
            connector,
            EnvelopeDecoder::new(),
            observer,
            config.socket_options(),
        )
    }

    pub fn connect(&self) -> Result<(), StreamError> {
        self.send(Control::Connect)
    }

    pub fn disconnect(&self) -> Result<(), StreamError> {
        self.send(Control::Disconnect)
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// State-change notifications. Intermediate states may be coalesced; the observer sees
    /// every transition.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub async fn wait_for_state(&self, target: ConnectionState) -> Result<(), StreamError> {
        let mut state = self.state.clone();
        state
            .wait_for(|current| *current == target)
            .await
            .map(|_| ())
            .map_err(|_| StreamError::DriverClosed)
    }

    /// Closes any open connection, stops the driver and returns the totals.
    pub async fn shutdown(self) -> Result<StreamSummary, StreamError> {
        let _ = self.control.send(Control::Shutdown);
        Ok(self.task.await?)
    }

    fn send(&self, control: Control) -> Result<(), StreamError> {
        self.control
            .send(control)
            .map_err(|_| StreamError::DriverClosed)
    }
}

struct Driver<C, D: LineDecoder, O> {
    connector: C,
    session: SocketSession<D, O>,
    control: mpsc::UnboundedReceiver<Control>,
    state: watch::Sender<ConnectionState>,
}

enum Established<T> {
    Open(T),
    Failed,
    Abandoned,
    Shutdown,
}

enum Pump {
    Event(SocketEvent),
    Expired,
    Control(Option<Control>),
}

impl<C, D, O> Driver<C, D, O>
where
    C: SocketConnector,
    D: LineDecoder,
    O: StreamObserver<D::Record>,
{
    async fn run(mut self) -> StreamSummary {
        loop {
            match self.control.recv().await {
                Some(Control::Connect) => {}
                Some(Control::Disconnect) => {
                    self.session.request_disconnect();
                    continue;
                }
                Some(Control::Shutdown) | None => break,
            }

            if let ConnectDecision::AlreadyActive(_) =
                self.session.request_connect(self.connector.url())
            {
                continue;
            }
            self.publish();

            match self.establish().await {
                Established::Open(transport) => {
                    if !self.pump(transport).await {
                        break;
                    }
                }
                Established::Failed | Established::Abandoned => {}
                Established::Shutdown => break,
            }
        }

        debug!("socket driver stopped");
        self.session.summary()
    }

    /// Waits for the connector while still answering control requests.
    async fn establish(&mut self) -> Established<C::Transport> {
        let connecting = self.connector.connect();
        tokio::pin!(connecting);

        loop {
            tokio::select! {
                result = &mut connecting => {
                    return match result {
                        Ok(transport) => Established::Open(transport),
                        Err(err) => {
                            let reason = err.to_string();
                            self.session.report_error(err.into());
                            settle(&mut self.session, &self.state, CLOSE_ABNORMAL, reason);
                            Established::Failed
                        }
                    };
                }
                control = self.control.recv() => match control {
                    Some(Control::Connect) => {
                        self.session.request_connect(self.connector.url());
                    }
                    Some(Control::Disconnect) => {
                        self.session.request_disconnect();
                        let reason = self.session.options().close_reason.clone();
                        settle(&mut self.session, &self.state, CLOSE_NORMAL, reason);
                        return Established::Abandoned;
                    }
                    Some(Control::Shutdown) | None => {
                        let reason = self.session.options().close_reason.clone();
                        settle(&mut self.session, &self.state, CLOSE_NORMAL, reason);
                        return Established::Shutdown;
                    }
                },
            }
        }
    }

    /// Runs one open connection until it closes. Returns `false` when the driver should stop.
    ///
    /// The idle deadline moves only when the transport yields an event; the close grace
    /// deadline is fixed once the close is sent.
    async fn pump(&mut self, mut transport: C::Transport) -> bool {
        let commands = self.session.handle_event(SocketEvent::Open);
        self.publish();
        self.execute(&mut transport, commands).await;

        let idle_timeout = self.session.options().idle_timeout;
        let mut deadline = idle_timeout.map(|window| Instant::now() + window);
        let mut closing = false;
        let mut keep_running = true;
        let mut control_open = true;

        loop {
            let next = tokio::select! {
                event = transport.next_event() => Pump::Event(event),
                () = expire(deadline) => Pump::Expired,
                control = self.control.recv(), if control_open => Pump::Control(control),
            };

            match next {
                Pump::Event(event) => {
                    let closed = matches!(event, SocketEvent::Close { .. });
                    let commands = self.session.handle_event(event);
                    self.publish();
                    if closed {
                        return keep_running;
                    }
                    if !closing {
                        deadline = idle_timeout.map(|window| Instant::now() + window);
                    }
                    self.execute(&mut transport, commands).await;
                }
                Pump::Expired if closing => {
                    warn!("close handshake timed out");
                    self.settle(CLOSE_ABNORMAL, "close handshake timed out".to_string());
                    return keep_running;
                }
                Pump::Expired => {
                    let idle_for = idle_timeout.unwrap_or_default();
                    self.session.report_error(StreamError::IdleTimeout { idle_for });
                    let reason = self.session.options().close_reason.clone();
                    self.begin_close(&mut transport, CLOSE_NORMAL, reason).await;
                    closing = true;
                    deadline = Some(Instant::now() + CLOSE_GRACE);
                }
                Pump::Control(Some(Control::Connect)) => {
                    self.session.request_connect(self.connector.url());
                }
                Pump::Control(Some(Control::Disconnect)) => {
                    if let Some(SocketCommand::Close { code, reason }) =
                        self.session.request_disconnect()
                    {
                        if !closing {
                            self.begin_close(&mut transport, code, reason).await;
                            closing = true;
                            deadline = Some(Instant::now() + CLOSE_GRACE);
                        }
                    }
                }
                Pump::Control(control) => {
                    if control.is_none() {
                        control_open = false;
                    }
                    keep_running = false;
                    if !closing {
                        self.session.request_disconnect();
                        let reason = self.session.options().close_reason.clone();
                        self.begin_close(&mut transport, CLOSE_NORMAL, reason).await;
                        closing = true;
                        deadline = Some(Instant::now() + CLOSE_GRACE);
                    }
                }
            }
        }
    }

    async fn execute(&mut self, transport: &mut C::Transport, commands: Vec<SocketCommand>) {
        for command in commands {
            let result = match &command {
                SocketCommand::Send(payload) => transport.send_text(payload.clone()).await,
                SocketCommand::Close { code, reason } => {
                    transport.close(*code, reason.clone()).await
                }
            };
            match result {
                Ok(()) => self.session.command_completed(&command),
                Err(err) => self.session.command_failed(&command, err),
            }
        }
    }

    async fn begin_close(&mut self, transport: &mut C::Transport, code: u16, reason: String) {
        info!(code, reason = %reason, "closing socket stream");
        self.execute(transport, vec![SocketCommand::Close { code, reason }])
            .await;
    }

    fn settle(&mut self, code: u16, reason: String) {
        settle(&mut self.session, &self.state, code, reason);
    }

    fn publish(&self) {
        publish(&self.state, self.session.state());
    }
}

/// Settles a connection that never produced its own close event.
fn settle<D, O>(
    session: &mut SocketSession<D, O>,
    state: &watch::Sender<ConnectionState>,
    code: u16,
    reason: String,
) where
    D: LineDecoder,
    O: StreamObserver<D::Record>,
{
    session.handle_event(SocketEvent::Close { code, reason });
    publish(state, session.state());
}

fn publish(state: &watch::Sender<ConnectionState>, current: ConnectionState) {
    state.send_if_modified(|published| {
        if *published == current {
            false
        } else {
            *published = current;
            true
        }
    });
}

/// Resolves at `deadline`, or never when there is none.
async fn expire(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
