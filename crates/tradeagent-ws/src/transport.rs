//! Transport boundary between the connection manager and the socket.
//!
//! A [`Connector`] turns a resolved endpoint into a [`TransportHandle`]:
//! construction is synchronous and may fail, the connection itself is
//! established in the background and reported as [`TransportEvent`]s.

use crate::endpoint::redact;
use crate::error::{WsError, WsResult};
use crate::event::{CloseEvent, Payload, CLOSE_NORMAL};
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async_tls_with_config;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

/// Close code reported for a close frame without a status.
pub const CLOSE_NO_STATUS: u16 = 1005;

/// Event emitted by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Open,
    Message(Payload),
    Error(String),
    /// Always the last event of a transport.
    Close(CloseEvent),
}

/// Command sent to a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Frame(Payload),
    Close,
}

/// Manager side of a live transport.
#[derive(Debug)]
pub struct TransportHandle {
    outbound: mpsc::UnboundedSender<Outbound>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Transport side of a [`TransportHandle`].
#[derive(Debug)]
pub struct TransportPeer {
    pub events: mpsc::UnboundedSender<TransportEvent>,
    pub outbound: mpsc::UnboundedReceiver<Outbound>,
}

impl TransportHandle {
    /// Create a connected handle/peer pair.
    pub fn pair() -> (TransportHandle, TransportPeer) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        (
            TransportHandle {
                outbound: outbound_tx,
                events: events_rx,
            },
            TransportPeer {
                events: events_tx,
                outbound: outbound_rx,
            },
        )
    }

    /// Queue a frame. Returns false if the transport is gone.
    pub(crate) fn send(&self, payload: Payload) -> bool {
        self.outbound.send(Outbound::Frame(payload)).is_ok()
    }

    pub(crate) async fn next_event(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }

    /// Stop listening for events, then ask the transport to close.
    ///
    /// The event receiver is dropped first so the resulting close can never
    /// reach the manager.
    pub(crate) fn detach_and_close(self) {
        let Self { outbound, events } = self;
        drop(events);
        let _ = outbound.send(Outbound::Close);
    }
}

/// Factory for transports.
pub trait Connector: Send + Sync + 'static {
    /// Start opening a transport to `endpoint`.
    ///
    /// Errors are construction failures (malformed endpoint, unsupported
    /// scheme); connection failures are reported as events instead.
    fn open(&self, endpoint: &str) -> WsResult<TransportHandle>;
}

/// [`Connector`] backed by tokio-tungstenite.
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

impl TungsteniteConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for TungsteniteConnector {
    fn open(&self, endpoint: &str) -> WsResult<TransportHandle> {
        let request = build_request(endpoint)?;
        let (handle, peer) = TransportHandle::pair();
        tokio::spawn(run_transport(request, redact(endpoint), peer));
        Ok(handle)
    }
}

/// Validate an endpoint and build the handshake request.
pub fn build_request(endpoint: &str) -> WsResult<Request> {
    let invalid = |reason: String| WsError::InvalidEndpoint {
        endpoint: redact(endpoint),
        reason,
    };

    let request = endpoint
        .into_client_request()
        .map_err(|e| invalid(e.to_string()))?;

    match request.uri().scheme_str() {
        Some("ws") | Some("wss") => Ok(request),
        Some(other) => Err(invalid(format!("unsupported scheme '{other}'"))),
        None => Err(invalid("missing scheme".to_string())),
    }
}

async fn run_transport(request: Request, endpoint: String, peer: TransportPeer) {
    let TransportPeer {
        events,
        mut outbound,
    } = peer;

    // TCP_NODELAY: frames are small and latency sensitive
    let connecting = connect_async_tls_with_config(request, None, true, None);
    tokio::pin!(connecting);

    let ws_stream = loop {
        tokio::select! {
            result = &mut connecting => match result {
                Ok((ws_stream, _response)) => break ws_stream,
                Err(e) => {
                    warn!(endpoint = %endpoint, error = %e, "WebSocket connect failed");
                    let _ = events.send(TransportEvent::Error(e.to_string()));
                    let _ = events.send(TransportEvent::Close(CloseEvent::abnormal()));
                    return;
                }
            },
            cmd = outbound.recv() => match cmd {
                Some(Outbound::Frame(_)) => debug!("Dropping frame queued before open"),
                Some(Outbound::Close) | None => {
                    debug!(endpoint = %endpoint, "Transport closed before handshake completed");
                    return;
                }
            },
        }
    };

    if events.send(TransportEvent::Open).is_err() {
        return;
    }
    debug!(endpoint = %endpoint, "WebSocket handshake completed");

    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            msg = read.next() => {
                let event = match msg {
                    Some(Ok(Message::Text(text))) => TransportEvent::Message(Payload::Text(text)),
                    Some(Ok(Message::Binary(bytes))) => TransportEvent::Message(Payload::Binary(bytes)),
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = write.send(Message::Pong(data)).await {
                            fail(&events, e.to_string());
                            return;
                        }
                        continue;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let close = frame
                            .map(|f| CloseEvent {
                                code: f.code.into(),
                                reason: f.reason.to_string(),
                                was_clean: true,
                            })
                            .unwrap_or(CloseEvent {
                                code: CLOSE_NO_STATUS,
                                reason: String::new(),
                                was_clean: true,
                            });
                        debug!(code = close.code, reason = %close.reason, "WebSocket closed by peer");
                        // flushes the close reply queued by tungstenite
                        let _ = write.close().await;
                        let _ = events.send(TransportEvent::Close(close));
                        return;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        fail(&events, e.to_string());
                        return;
                    }
                    None => {
                        let _ = events.send(TransportEvent::Close(CloseEvent::abnormal()));
                        return;
                    }
                };

                if events.send(event).is_err() {
                    // manager detached
                    close_quietly(&mut write).await;
                    return;
                }
            }

            cmd = outbound.recv() => match cmd {
                Some(Outbound::Frame(payload)) => {
                    let msg = match payload {
                        Payload::Text(text) => Message::Text(text),
                        Payload::Binary(bytes) => Message::Binary(bytes),
                    };
                    if let Err(e) = write.send(msg).await {
                        fail(&events, e.to_string());
                        return;
                    }
                }
                Some(Outbound::Close) | None => {
                    debug!(endpoint = %endpoint, "Closing WebSocket");
                    close_quietly(&mut write).await;
                    return;
                }
            },
        }
    }
}

fn fail(events: &mpsc::UnboundedSender<TransportEvent>, message: String) {
    warn!(error = %message, "WebSocket transport error");
    let _ = events.send(TransportEvent::Error(message));
    let _ = events.send(TransportEvent::Close(CloseEvent::abnormal()));
}

async fn close_quietly<S>(write: &mut S)
where
    S: Sink<Message> + Unpin,
{
    let frame = CloseFrame {
        code: CloseCode::from(CLOSE_NORMAL),
        reason: "".into(),
    };
    let _ = write.send(Message::Close(Some(frame))).await;
    let _ = write.close().await;
}
