//! Structured logging for tradeagent.
//!
//! Pretty output for development, JSON output when `RUST_ENV=production`.

pub mod error;
pub mod logging;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{init_logging, LogFormat, DEFAULT_FILTER};
