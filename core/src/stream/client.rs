//! Resilient event-stream client.
//!
//! [`StreamClient`] owns one logical connection to the backend. A background
//! task opens a transport, pumps inbound `state_update` frames to the
//! registered handlers and drains outbound `state_change` requests, and when
//! the transport is lost it waits out the [`ReconnectPolicy`] delay and tries
//! again, forever, until [`StreamClient::close`] is called. An attempt that
//! has not produced an open transport within the connect timeout counts as a
//! failed attempt.
//!
//! ```text
//!            connect()
//!   Closed ────────────► Connecting ──ok──► Open
//!     ▲                     ▲   │             │ error / remote close
//!     │                     │   │ failed      ▼
//!     │                delay│   └────────► Closed
//!     │                     │                 │
//!     │                Reconnecting ◄─────────┘
//!     │
//!   close() (from any state; terminal)
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::backoff::ReconnectPolicy;
use super::protocol::{self, ClientMessage, ServerMessage};
use super::transport::{Connector, Transport};
use crate::error::TransportError;
use crate::state::State;

/// Default bound on one connection attempt, handshake included.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Status of the persistent connection. Driven only by the client itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
    Reconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closed => "closed",
            ConnectionState::Reconnecting => "reconnecting",
        };
        f.write_str(s)
    }
}

/// Callback for authoritative state broadcasts.
pub type InboundHandler = Arc<dyn Fn(State) + Send + Sync>;

/// Fire-and-forget outlet for transition requests.
///
/// Implemented by [`StreamClient`]; the controller only sees this seam.
pub trait TransitionSink: Send + Sync {
    fn send(&self, to: State);
}

pub struct StreamClient {
    shared: Arc<Shared>,
    cmd_rx: Mutex<Option<mpsc::UnboundedReceiver<ClientMessage>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// State shared between the client handle and the connection task.
struct Shared {
    connector: Arc<dyn Connector>,
    policy: ReconnectPolicy,
    connect_timeout: Duration,
    conn_tx: watch::Sender<ConnectionState>,
    handlers: RwLock<Vec<InboundHandler>>,
    cmd_tx: mpsc::UnboundedSender<ClientMessage>,
    closed: AtomicBool,
    shutdown: Notify,
}

impl StreamClient {
    pub fn new(connector: Arc<dyn Connector>, policy: ReconnectPolicy) -> Self {
        Self::with_connect_timeout(connector, policy, DEFAULT_CONNECT_TIMEOUT)
    }

    /// Like [`StreamClient::new`], with an explicit bound on each attempt.
    pub fn with_connect_timeout(
        connector: Arc<dyn Connector>,
        policy: ReconnectPolicy,
        connect_timeout: Duration,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (conn_tx, _) = watch::channel(ConnectionState::Closed);
        Self {
            shared: Arc::new(Shared {
                connector,
                policy,
                connect_timeout,
                conn_tx,
                handlers: RwLock::new(Vec::new()),
                cmd_tx,
                closed: AtomicBool::new(false),
                shutdown: Notify::new(),
            }),
            cmd_rx: Mutex::new(Some(cmd_rx)),
            task: Mutex::new(None),
        }
    }

    /// Starts the background connection task.
    ///
    /// Idempotent: a no-op while the task is running and after [`close`].
    /// Must be called from within a tokio runtime.
    ///
    /// [`close`]: StreamClient::close
    pub fn connect(&self) {
        if self.is_closed() {
            debug!(target: "statelink.stream", "connect ignored: client is closed");
            return;
        }
        let Some(cmd_rx) = self.cmd_rx.lock().ok().and_then(|mut rx| rx.take()) else {
            debug!(target: "statelink.stream", "connect ignored: already running");
            return;
        };

        self.shared.set_state(ConnectionState::Connecting);
        let handle = tokio::spawn(connection_loop(Arc::clone(&self.shared), cmd_rx));
        if let Ok(mut task) = self.task.lock() {
            *task = Some(handle);
        }
    }

    /// Registers a handler for every well-formed inbound state broadcast.
    ///
    /// Handlers run on the connection task, in arrival order, and must not
    /// block.
    pub fn on_inbound_update<F>(&self, handler: F)
    where
        F: Fn(State) + Send + Sync + 'static,
    {
        if let Ok(mut handlers) = self.shared.handlers.write() {
            handlers.push(Arc::new(handler));
        }
    }

    /// Best-effort request for a state change.
    ///
    /// Dropped silently unless the connection is [`ConnectionState::Open`];
    /// nothing is queued for a later connection.
    pub fn send(&self, to: State) {
        let conn = self.connection_state();
        if conn != ConnectionState::Open {
            debug!(
                target: "statelink.stream",
                state = %to,
                connection = %conn,
                "dropping state_change while not connected"
            );
            return;
        }
        if self
            .shared
            .cmd_tx
            .send(ClientMessage::StateChange { state: to })
            .is_err()
        {
            debug!(target: "statelink.stream", state = %to, "connection task gone; dropping");
        }
    }

    /// Closes the connection and stops reconnecting, permanently.
    ///
    /// Safe to call from any thread, any number of times.
    pub fn close(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!(
            target: "statelink.stream",
            endpoint = self.shared.connector.endpoint(),
            "closing stream client"
        );
        // Stored permit wakes the loop even if it is not waiting right now.
        self.shared.shutdown.notify_one();
        if self.task.lock().map(|task| task.is_none()).unwrap_or(true) {
            self.shared.set_state(ConnectionState::Closed);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.shared.conn_tx.borrow()
    }

    pub fn subscribe_connection(&self) -> watch::Receiver<ConnectionState> {
        self.shared.conn_tx.subscribe()
    }

    pub fn endpoint(&self) -> &str {
        self.shared.connector.endpoint()
    }

    /// Waits for the background task to finish after [`close`](Self::close).
    pub async fn join(&self) {
        let handle = self.task.lock().ok().and_then(|mut task| task.take());
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(target: "statelink.stream", "connection task ended abnormally: {e}");
            }
        }
    }
}

impl TransitionSink for StreamClient {
    fn send(&self, to: State) {
        StreamClient::send(self, to);
    }
}

impl fmt::Debug for StreamClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamClient")
            .field("endpoint", &self.endpoint())
            .field("connection", &self.connection_state())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Drop for StreamClient {
    fn drop(&mut self) {
        self.close();
    }
}

impl Shared {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn set_state(&self, next: ConnectionState) {
        let prev = self.conn_tx.send_replace(next);
        if prev != next {
            debug!(target: "statelink.stream", from = %prev, to = %next, "connection state");
        }
    }

    fn dispatch(&self, frame: &str) {
        match protocol::decode_server(frame) {
            Ok(ServerMessage::StateUpdate { state }) => {
                let handlers = match self.handlers.read() {
                    Ok(handlers) => handlers.clone(),
                    Err(_) => return,
                };
                debug!(target: "statelink.stream", %state, "state_update received");
                for handler in handlers {
                    handler(state);
                }
            }
            Err(e) => {
                warn!(target: "statelink.stream", error = %e, raw = frame, "dropping inbound frame");
            }
        }
    }
}

enum SessionEnd {
    Shutdown,
    Lost(String),
}

async fn connection_loop(shared: Arc<Shared>, mut cmd_rx: mpsc::UnboundedReceiver<ClientMessage>) {
    let endpoint = shared.connector.endpoint().to_string();
    let mut failures: u32 = 0;

    loop {
        if shared.is_closed() {
            break;
        }
        shared.set_state(ConnectionState::Connecting);

        let connected = tokio::select! {
            res = attempt_connect(&shared, &endpoint) => res,
            _ = shared.shutdown.notified() => break,
        };

        match connected {
            Ok(mut transport) => {
                failures = 0;
                shared.set_state(ConnectionState::Open);
                info!(target: "statelink.stream", %endpoint, "connection open");

                let end = run_session(&shared, transport.as_mut(), &mut cmd_rx).await;
                shared.set_state(ConnectionState::Closed);
                discard_pending(&mut cmd_rx);

                match end {
                    SessionEnd::Shutdown => {
                        if let Err(e) = transport.close().await {
                            debug!(target: "statelink.stream", "close after shutdown: {e}");
                        }
                        break;
                    }
                    SessionEnd::Lost(reason) => {
                        warn!(target: "statelink.stream", %endpoint, %reason, "connection lost");
                    }
                }
            }
            Err(e) => {
                warn!(target: "statelink.stream", error = %e, "connect attempt failed");
            }
        }

        if shared.is_closed() {
            break;
        }
        failures = failures.saturating_add(1);
        let delay = shared.policy.delay_for(failures);
        shared.set_state(ConnectionState::Reconnecting);
        debug!(
            target: "statelink.stream",
            delay_ms = delay.as_millis() as u64,
            failures,
            "scheduling reconnect"
        );
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shared.shutdown.notified() => break,
        }
    }

    shared.set_state(ConnectionState::Closed);
    debug!(target: "statelink.stream", %endpoint, "connection loop exited");
}

/// One connection attempt, bounded by the connect timeout. A handshake that
/// never completes is reported like any other connect failure.
async fn attempt_connect(
    shared: &Shared,
    endpoint: &str,
) -> Result<Box<dyn Transport>, TransportError> {
    match tokio::time::timeout(shared.connect_timeout, shared.connector.connect()).await {
        Ok(res) => res,
        Err(_) => Err(TransportError::Connect {
            endpoint: endpoint.to_string(),
            reason: format!("timed out after {}ms", shared.connect_timeout.as_millis()),
        }),
    }
}

/// Pumps one open transport until it is lost or the client shuts down.
async fn run_session(
    shared: &Shared,
    transport: &mut dyn Transport,
    cmd_rx: &mut mpsc::UnboundedReceiver<ClientMessage>,
) -> SessionEnd {
    loop {
        tokio::select! {
            biased;

            _ = shared.shutdown.notified() => return SessionEnd::Shutdown,

            cmd = cmd_rx.recv() => {
                let Some(msg) = cmd else {
                    return SessionEnd::Shutdown;
                };
                let frame = match protocol::encode(&msg) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(target: "statelink.stream", "failed to encode {msg:?}: {e}");
                        continue;
                    }
                };
                if let Err(e) = transport.send(frame).await {
                    return SessionEnd::Lost(e.to_string());
                }
                debug!(target: "statelink.stream", ?msg, "state_change sent");
            }

            incoming = transport.recv() => match incoming {
                Some(Ok(frame)) => shared.dispatch(&frame),
                Some(Err(e)) => return SessionEnd::Lost(e.to_string()),
                None => return SessionEnd::Lost("remote closed the connection".into()),
            },
        }
    }
}

/// Requests accepted while the connection was still open but not yet written
/// belong to that connection; they are not replayed on the next one.
fn discard_pending(cmd_rx: &mut mpsc::UnboundedReceiver<ClientMessage>) {
    let mut dropped = 0usize;
    while cmd_rx.try_recv().is_ok() {
        dropped += 1;
    }
    if dropped > 0 {
        debug!(target: "statelink.stream", dropped, "discarded unsent state_change requests");
    }
}
