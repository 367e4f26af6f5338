//! WebSocket connection manager.
//!
//! Owns one logical connection: establishes it, tracks status, delivers
//! inbound messages to the handlers, accepts outbound sends and reconnects
//! after an unexpected close, up to `reconnect_limit` attempts spaced by a
//! fixed `reconnect_interval`.
//!
//! All mutable state lives in a single driver task. Commands, transport
//! events and the reconnect timer are processed one at a time by its
//! `select!` loop, so an intentional teardown can never race an automatic
//! reconnect.

use crate::config::ConnectionConfig;
use crate::endpoint::{redact, resolve_endpoint};
use crate::error::{WsError, WsResult};
use crate::event::{
    CloseEvent, ConnectionStatus, ErrorEvent, Handlers, MessageEvent, OpenEvent, Payload,
};
use crate::transport::{Connector, TransportEvent, TransportHandle};
use parking_lot::RwLock;
use serde::Serialize;
use std::future::pending;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, Sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug)]
enum Command {
    Connect,
    Send(Payload),
    Disconnect,
}

/// Handle to a managed connection.
///
/// Dropping the manager tears the connection down without triggering a
/// reconnect.
pub struct ConnectionManager {
    command_tx: mpsc::UnboundedSender<Command>,
    status_rx: watch::Receiver<ConnectionStatus>,
    last_message: Arc<RwLock<Option<MessageEvent>>>,
    reconnect_attempts: Arc<AtomicU32>,
    shutdown_token: CancellationToken,
}

impl ConnectionManager {
    /// Create a manager and spawn its driver task.
    ///
    /// The manager starts `Closed`; call [`connect`](Self::connect) to open
    /// the connection. Must be called within a tokio runtime.
    pub fn new<C: Connector>(config: ConnectionConfig, connector: C, handlers: Handlers) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Closed);
        let last_message = Arc::new(RwLock::new(None));
        let reconnect_attempts = Arc::new(AtomicU32::new(0));
        let shutdown_token = CancellationToken::new();

        let driver = Driver {
            config,
            connector: Box::new(connector),
            handlers,
            status_tx,
            last_message: last_message.clone(),
            reconnect_attempts: reconnect_attempts.clone(),
            link: None,
            attempts: 0,
            pending_reconnect: None,
        };
        tokio::spawn(driver.run(command_rx, shutdown_token.clone()));

        Self {
            command_tx,
            status_rx,
            last_message,
            reconnect_attempts,
            shutdown_token,
        }
    }

    /// Open the connection. No-op if it is already open.
    pub fn connect(&self) {
        self.command(Command::Connect);
    }

    /// Send a payload if the connection is open.
    ///
    /// Sends are fire-and-forget: nothing is queued while disconnected.
    ///
    /// # Errors
    ///
    /// - `WsError::NotOpen`: connection not open, payload dropped
    /// - `WsError::Shutdown`: manager has shut down
    pub fn send(&self, payload: impl Into<Payload>) -> WsResult<()> {
        let payload = payload.into();
        let status = self.status();
        if status != ConnectionStatus::Open {
            warn!(%status, bytes = payload.len(), "Connection not open, message not sent");
            return Err(WsError::NotOpen);
        }
        self.command_tx
            .send(Command::Send(payload))
            .map_err(|_| WsError::Shutdown)
    }

    pub fn send_text(&self, text: impl Into<String>) -> WsResult<()> {
        self.send(Payload::Text(text.into()))
    }

    /// Serialize `value` as JSON and send it.
    pub fn send_json<T: Serialize + ?Sized>(&self, value: &T) -> WsResult<()> {
        let value = serde_json::to_value(value)?;
        self.send(value)
    }

    /// Close the connection and cancel any pending reconnect.
    ///
    /// No handler fires as a result. The manager can be connected again.
    pub fn disconnect(&self) {
        self.command(Command::Disconnect);
    }

    /// Tear down the connection and stop the driver task.
    pub fn shutdown(&self) {
        info!("ConnectionManager shutdown requested");
        self.shutdown_token.cancel();
    }

    /// Current connection status.
    pub fn status(&self) -> ConnectionStatus {
        *self.status_rx.borrow()
    }

    /// Receiver notified on every status change.
    pub fn status_receiver(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_rx.clone()
    }

    /// Most recently received message.
    pub fn last_message(&self) -> Option<MessageEvent> {
        self.last_message.read().clone()
    }

    /// Reconnect attempts since the last successful open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts.load(Ordering::Acquire)
    }

    fn command(&self, cmd: Command) {
        if self.command_tx.send(cmd).is_err() {
            warn!("ConnectionManager driver has stopped, command ignored");
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.shutdown_token.cancel();
    }
}

/// Live transport plus whether it is open (reported `Open`, no error since).
struct Link {
    handle: TransportHandle,
    /// Redacted endpoint, for logs and the open event.
    endpoint: String,
    open: bool,
}

struct Driver {
    config: ConnectionConfig,
    connector: Box<dyn Connector>,
    handlers: Handlers,
    status_tx: watch::Sender<ConnectionStatus>,
    last_message: Arc<RwLock<Option<MessageEvent>>>,
    reconnect_attempts: Arc<AtomicU32>,
    /// At most one live transport.
    link: Option<Link>,
    attempts: u32,
    pending_reconnect: Option<Pin<Box<Sleep>>>,
}

impl Driver {
    async fn run(
        mut self,
        mut command_rx: mpsc::UnboundedReceiver<Command>,
        shutdown_token: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;

                () = shutdown_token.cancelled() => {
                    self.teardown();
                    break;
                }

                cmd = command_rx.recv() => match cmd {
                    Some(Command::Connect) => self.connect(),
                    Some(Command::Send(payload)) => self.send(payload),
                    Some(Command::Disconnect) => self.teardown(),
                    None => {
                        self.teardown();
                        break;
                    }
                },

                event = next_event(&mut self.link) => {
                    // a transport that vanished without a close is an abnormal close
                    let event = event.unwrap_or_else(|| TransportEvent::Close(CloseEvent::abnormal()));
                    self.on_transport_event(event);
                }

                () = reconnect_due(&mut self.pending_reconnect) => {
                    self.pending_reconnect = None;
                    debug!(attempt = self.attempts, "Reconnect timer fired");
                    self.connect();
                }
            }
        }
        debug!("ConnectionManager driver stopped");
    }

    fn connect(&mut self) {
        if self.link.as_ref().is_some_and(|link| link.open) {
            info!("WebSocket already open");
            return;
        }

        // a manual connect supersedes a scheduled one
        self.pending_reconnect = None;
        if let Some(stale) = self.link.take() {
            debug!("Replacing transport that is not open");
            stale.handle.detach_and_close();
        }

        self.set_status(ConnectionStatus::Connecting);
        let endpoint = resolve_endpoint(&self.config);
        let redacted = redact(&endpoint);
        info!(endpoint = %redacted, "Connecting to WebSocket");

        match self.connector.open(&endpoint) {
            Ok(handle) => {
                self.link = Some(Link {
                    handle,
                    endpoint: redacted,
                    open: false,
                });
            }
            Err(e) => {
                error!(error = %e, "Failed to create WebSocket");
                self.set_status(ConnectionStatus::Error);
                self.handlers.error(&ErrorEvent {
                    message: e.to_string(),
                });
            }
        }
    }

    fn send(&mut self, payload: Payload) {
        match self.link.as_ref() {
            Some(link) if link.open => {
                let bytes = payload.len();
                if link.handle.send(payload) {
                    debug!(bytes, "WebSocket message sent");
                } else {
                    warn!(bytes, "Transport gone, message not sent");
                }
            }
            _ => warn!(
                bytes = payload.len(),
                "Connection not open, message not sent"
            ),
        }
    }

    fn on_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Open => {
                let endpoint = match self.link.as_mut() {
                    Some(link) => {
                        link.open = true;
                        link.endpoint.clone()
                    }
                    None => String::new(),
                };
                self.attempts = 0;
                self.reconnect_attempts.store(0, Ordering::Release);
                self.set_status(ConnectionStatus::Open);
                info!(endpoint = %endpoint, "WebSocket connection established");
                self.handlers.open(&OpenEvent { endpoint });
            }
            TransportEvent::Message(payload) => {
                debug!(bytes = payload.len(), "WebSocket message received");
                let message = MessageEvent {
                    payload,
                    received_at: chrono::Utc::now(),
                };
                *self.last_message.write() = Some(message.clone());
                self.handlers.message(&message);
            }
            TransportEvent::Error(message) => {
                error!(error = %message, "WebSocket error");
                // the link stays attached for a trailing close, but it no
                // longer counts as open for connect() and send()
                if let Some(link) = self.link.as_mut() {
                    link.open = false;
                }
                self.set_status(ConnectionStatus::Error);
                self.handlers.error(&ErrorEvent { message });
            }
            TransportEvent::Close(close) => {
                info!(
                    code = close.code,
                    reason = %close.reason,
                    was_clean = close.was_clean,
                    "WebSocket connection closed"
                );
                self.link = None;
                self.set_status(ConnectionStatus::Closed);
                self.handlers.close(&close);
                self.schedule_reconnect();
            }
        }
    }

    fn schedule_reconnect(&mut self) {
        if !self.config.reconnect_enabled() {
            return;
        }
        let limit = self.config.reconnect_limit;

        if self.attempts < limit {
            self.attempts += 1;
            self.reconnect_attempts
                .store(self.attempts, Ordering::Release);
            info!(
                attempt = self.attempts,
                limit,
                delay_ms = self.config.reconnect_interval.as_millis() as u64,
                "Scheduling reconnect"
            );
            self.pending_reconnect = Some(Box::pin(sleep(self.config.reconnect_interval)));
        } else {
            error!(attempts = self.attempts, limit, "WebSocket reconnect limit reached");
            self.handlers.reconnect_exhausted(self.attempts);
        }
    }

    /// Detach and close the transport without notifying handlers.
    fn teardown(&mut self) {
        self.pending_reconnect = None;
        if let Some(link) = self.link.take() {
            info!("Closing WebSocket connection on teardown");
            link.handle.detach_and_close();
        }
        self.attempts = 0;
        self.reconnect_attempts.store(0, Ordering::Release);
        self.set_status(ConnectionStatus::Closed);
    }

    fn set_status(&self, status: ConnectionStatus) {
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                debug!(from = %current, to = %status, "Connection status changed");
                *current = status;
                true
            }
        });
    }
}

async fn next_event(link: &mut Option<Link>) -> Option<TransportEvent> {
    match link {
        Some(link) => link.handle.next_event().await,
        None => pending().await,
    }
}

async fn reconnect_due(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(timer) => timer.as_mut().await,
        None => pending().await,
    }
}
