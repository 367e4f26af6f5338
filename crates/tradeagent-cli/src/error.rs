//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tradeagent_ws::WsError),

    #[error("Hub error: {0}")]
    Hub(#[from] tradeagent_hub::HubError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] tradeagent_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
