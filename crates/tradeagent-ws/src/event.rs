//! Connection events and the handler slots that observe them.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Close code reported when the transport ends without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Close code for an intentional, normal close.
pub const CLOSE_NORMAL: u16 = 1000;

/// Connection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connecting,
    Open,
    #[default]
    Closed,
    Error,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Message payload carried in either direction.
///
/// Outbound values convert to `Text`: strings as-is, everything else as JSON.
/// `Binary` is only sent when built explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Binary(Vec<u8>),
}

impl Payload {
    /// Text content, if this is a text payload.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Binary(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

/// JSON strings are sent raw; every other value is serialized.
impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(text) => Self::Text(text),
            other => Self::Text(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenEvent {
    /// Endpoint with the token redacted.
    pub endpoint: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEvent {
    pub payload: Payload,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEvent {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseEvent {
    pub code: u16,
    pub reason: String,
    pub was_clean: bool,
}

impl CloseEvent {
    /// Close reported when the transport vanished without a close handshake.
    pub fn abnormal() -> Self {
        Self {
            code: CLOSE_ABNORMAL,
            reason: String::new(),
            was_clean: false,
        }
    }
}

type Handler<E> = Box<dyn FnMut(&E) + Send>;

/// Optional handler slots, fixed at construction.
///
/// Handlers run on the manager's driver task within the turn that detected
/// the transition, so they must not block.
#[derive(Default)]
pub struct Handlers {
    pub(crate) on_open: Option<Handler<OpenEvent>>,
    pub(crate) on_message: Option<Handler<MessageEvent>>,
    pub(crate) on_error: Option<Handler<ErrorEvent>>,
    pub(crate) on_close: Option<Handler<CloseEvent>>,
    pub(crate) on_reconnect_exhausted: Option<Handler<u32>>,
}

impl Handlers {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn on_open(mut self, f: impl FnMut(&OpenEvent) + Send + 'static) -> Self {
        self.on_open = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_message(mut self, f: impl FnMut(&MessageEvent) + Send + 'static) -> Self {
        self.on_message = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_error(mut self, f: impl FnMut(&ErrorEvent) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_close(mut self, f: impl FnMut(&CloseEvent) + Send + 'static) -> Self {
        self.on_close = Some(Box::new(f));
        self
    }

    /// Fired when the reconnect limit is reached. Receives the attempt count.
    #[must_use]
    pub fn on_reconnect_exhausted(mut self, f: impl FnMut(&u32) + Send + 'static) -> Self {
        self.on_reconnect_exhausted = Some(Box::new(f));
        self
    }

    pub(crate) fn open(&mut self, event: &OpenEvent) {
        if let Some(f) = self.on_open.as_mut() {
            f(event);
        }
    }

    pub(crate) fn message(&mut self, event: &MessageEvent) {
        if let Some(f) = self.on_message.as_mut() {
            f(event);
        }
    }

    pub(crate) fn error(&mut self, event: &ErrorEvent) {
        if let Some(f) = self.on_error.as_mut() {
            f(event);
        }
    }

    pub(crate) fn close(&mut self, event: &CloseEvent) {
        if let Some(f) = self.on_close.as_mut() {
            f(event);
        }
    }

    pub(crate) fn reconnect_exhausted(&mut self, attempts: u32) {
        if let Some(f) = self.on_reconnect_exhausted.as_mut() {
            f(&attempts);
        }
    }
}
