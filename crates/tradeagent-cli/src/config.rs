//! Application configuration.
//!
//! Loaded from an optional TOML file layered with `TRADEAGENT__SECTION__KEY`
//! environment overrides. Every field has a default, so an empty file (or no
//! file at all) yields a runnable configuration.

use crate::error::{AppError, AppResult};
use config::{Environment, File, FileFormat, Source};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tradeagent_hub::HubConfig;
use tradeagent_ws::ConnectionConfig;

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "TRADEAGENT_CONFIG";

/// Config file used when neither `--config` nor `TRADEAGENT_CONFIG` is set.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

const ENV_PREFIX: &str = "TRADEAGENT";
const ENV_SEPARATOR: &str = "__";

/// WebSocket client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Endpoint template with a `{subject_id}` placeholder.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Subject substituted into the endpoint. `default_user` when unset.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Literal auth token.
    #[serde(default)]
    pub token: Option<String>,
    /// Environment variable holding the token, read on every attempt.
    /// Takes precedence over `token`.
    #[serde(default)]
    pub token_env: Option<String>,
    /// Automatic reconnection attempts after a close (0 = disabled).
    #[serde(default = "default_reconnect_limit")]
    pub reconnect_limit: u32,
    /// Delay before each reconnection attempt (ms).
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
}

fn default_endpoint() -> String {
    "ws://127.0.0.1:8000/ws/{subject_id}".to_string()
}

fn default_reconnect_limit() -> u32 {
    5
}

fn default_reconnect_interval_ms() -> u64 {
    5_000
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            user_id: None,
            token: None,
            token_env: None,
            reconnect_limit: default_reconnect_limit(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
        }
    }
}

impl ClientConfig {
    /// Build the connection manager configuration.
    pub fn to_connection_config(&self) -> ConnectionConfig {
        let mut config = ConnectionConfig::new(self.endpoint.clone())
            .with_reconnect_limit(self.reconnect_limit)
            .with_reconnect_interval(Duration::from_millis(self.reconnect_interval_ms));

        if let Some(user_id) = self.user_id.clone() {
            config = config.with_subject_provider(move || Some(user_id.clone()));
        }

        match (self.token_env.clone(), self.token.clone()) {
            (Some(var), _) => {
                config = config.with_token_provider(move || std::env::var(&var).ok());
            }
            (None, Some(token)) => {
                config = config.with_token_provider(move || Some(token.clone()));
            }
            (None, None) => {}
        }

        config
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    tradeagent_telemetry::DEFAULT_FILTER.to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub hub: HubConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Pick the config path: explicit argument, then `TRADEAGENT_CONFIG`,
    /// then the default path.
    pub fn resolve_path(explicit: Option<String>) -> (String, bool) {
        match explicit.or_else(|| std::env::var(CONFIG_PATH_ENV).ok()) {
            Some(path) => (path, true),
            None => (DEFAULT_CONFIG_PATH.to_string(), false),
        }
    }

    /// Load configuration from `path` plus environment overrides.
    ///
    /// A missing file is an error only when `required` is set.
    pub fn load(path: &str, required: bool) -> AppResult<Self> {
        Self::from_source(File::new(path, FileFormat::Toml).required(required))
    }

    /// Parse configuration from TOML text plus environment overrides.
    pub fn from_toml_str(content: &str) -> AppResult<Self> {
        Self::from_source(File::from_str(content, FileFormat::Toml))
    }

    fn from_source<S>(source: S) -> AppResult<Self>
    where
        S: Source + Send + Sync + 'static,
    {
        config::Config::builder()
            .add_source(source)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| AppError::Config(format!("Failed to load config: {e}")))
    }

    /// Render the configuration as TOML.
    pub fn to_toml(&self) -> AppResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(format!("Failed to serialize config: {e}")))
    }
}
