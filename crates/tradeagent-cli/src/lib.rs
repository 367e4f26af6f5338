//! tradeagent command-line application.
//!
//! Wires the real-time channel crates together:
//! - `connect`: WebSocket client with automatic reconnection
//! - `serve`: hub server with a console for pushing messages
//! - `config`: print the effective configuration

pub mod app;
pub mod config;
pub mod error;

pub use app::{Application, HubCommand};
pub use config::{AppConfig, ClientConfig, TelemetryConfig};
pub use error::{AppError, AppResult};
