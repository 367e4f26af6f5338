//! Hub configuration.

use serde::{Deserialize, Serialize};

/// Hub server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubConfig {
    /// Address to listen on.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Token clients must pass as `?token=` (empty = disabled).
    #[serde(default)]
    pub access_token: String,
    /// Maximum concurrent sockets per user.
    #[serde(default = "default_max_connections_per_user")]
    pub max_connections_per_user: usize,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_max_connections_per_user() -> usize {
    8
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            access_token: String::new(),
            max_connections_per_user: default_max_connections_per_user(),
        }
    }
}

impl HubConfig {
    /// Check if token authentication is enabled.
    pub fn auth_enabled(&self) -> bool {
        !self.access_token.is_empty()
    }

    /// Whether `token` grants access.
    pub fn authorize(&self, token: Option<&str>) -> bool {
        !self.auth_enabled() || token == Some(self.access_token.as_str())
    }
}
