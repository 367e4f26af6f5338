//! WebSocket client for the tradeagent real-time channel.
//!
//! Provides a single-connection manager with:
//! - Endpoint resolution from a `{subject_id}` template plus token query
//! - Status tracking (`connecting`, `open`, `closed`, `error`)
//! - Handler slots for open/message/error/close
//! - Automatic reconnection with a fixed delay and bounded attempts
//! - Teardown that never triggers a reconnect

pub mod config;
pub mod connection;
pub mod endpoint;
pub mod error;
pub mod event;
pub mod transport;

pub use config::{ConnectionConfig, Provider, DEFAULT_RECONNECT_INTERVAL};
pub use connection::ConnectionManager;
pub use endpoint::{redact, resolve, resolve_endpoint, DEFAULT_SUBJECT};
pub use error::{WsError, WsResult};
pub use event::{
    CloseEvent, ConnectionStatus, ErrorEvent, Handlers, MessageEvent, OpenEvent, Payload,
};
pub use transport::{
    Connector, Outbound, TransportEvent, TransportHandle, TransportPeer, TungsteniteConnector,
};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any `wss://` connections are made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
