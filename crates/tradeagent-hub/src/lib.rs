//! tradeagent-hub - Server side of the real-time channel.
//!
//! Accepts WebSocket clients on `/ws/{user_id}`, echoes their text frames
//! and lets the host process push messages to one user or to everyone.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  axum HTTP server                                        │
//! │    GET /ws/{user_id}?token=..  → WebSocket upgrade       │
//! │    GET /health                 → JSON connection summary │
//! └─────────────────────────┬────────────────────────────────┘
//!                           ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │  ConnectionRegistry (user_id → sockets)                  │
//! │    send_personal / broadcast → per-socket queues         │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use tradeagent_hub::{run_server, HubConfig, HubState};
//!
//! let state = HubState::new(HubConfig::default());
//! let registry = state.registry().clone();
//! tokio::spawn(run_server(state, shutdown_signal()));
//!
//! registry.broadcast("maintenance in 5 minutes");
//! ```

mod config;
mod error;
mod registry;
mod server;

pub use config::HubConfig;
pub use error::{HubError, HubResult};
pub use registry::{ConnectionId, ConnectionInfo, ConnectionRegistry};
pub use server::{create_router, echo_reply, run_server, serve, HubState};
