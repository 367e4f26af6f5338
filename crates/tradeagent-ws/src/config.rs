//! Connection configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default delay between reconnection attempts.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(5000);

/// Capability hook returning an optional value (auth token, subject id).
pub type Provider = Arc<dyn Fn() -> Option<String> + Send + Sync>;

/// Immutable per-connection configuration.
#[derive(Clone)]
pub struct ConnectionConfig {
    /// Endpoint URL containing a `{subject_id}` (or `{user_id}`) placeholder.
    pub endpoint_template: String,
    /// Maximum automatic reconnection attempts (0 = disabled).
    pub reconnect_limit: u32,
    /// Fixed delay before each reconnection attempt.
    pub reconnect_interval: Duration,
    /// Returns the auth token appended as `token=` query parameter.
    pub token_provider: Option<Provider>,
    /// Returns the subject identifier substituted into the template.
    pub subject_provider: Option<Provider>,
}

impl ConnectionConfig {
    pub fn new(endpoint_template: impl Into<String>) -> Self {
        Self {
            endpoint_template: endpoint_template.into(),
            reconnect_limit: 0,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            token_provider: None,
            subject_provider: None,
        }
    }

    #[must_use]
    pub fn with_reconnect_limit(mut self, limit: u32) -> Self {
        self.reconnect_limit = limit;
        self
    }

    #[must_use]
    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    #[must_use]
    pub fn with_token_provider<F>(mut self, provider: F) -> Self
    where
        F: Fn() -> Option<String> + Send + Sync + 'static,
    {
        self.token_provider = Some(Arc::new(provider));
        self
    }

    #[must_use]
    pub fn with_subject_provider<F>(mut self, provider: F) -> Self
    where
        F: Fn() -> Option<String> + Send + Sync + 'static,
    {
        self.subject_provider = Some(Arc::new(provider));
        self
    }

    /// Whether automatic reconnection is enabled at all.
    pub fn reconnect_enabled(&self) -> bool {
        self.reconnect_limit > 0
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new(String::new())
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("endpoint_template", &self.endpoint_template)
            .field("reconnect_limit", &self.reconnect_limit)
            .field("reconnect_interval", &self.reconnect_interval)
            .field("token_provider", &self.token_provider.is_some())
            .field("subject_provider", &self.subject_provider.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ConnectionConfig::default();
        assert_eq!(config.reconnect_limit, 0);
        assert_eq!(config.reconnect_interval, Duration::from_millis(5000));
        assert!(!config.reconnect_enabled());
    }

    #[test]
    fn test_debug_hides_providers() {
        let config = ConnectionConfig::new("wss://host/ws/{subject_id}")
            .with_token_provider(|| Some("secret".to_string()));
        let debug = format!("{config:?}");
        assert!(debug.contains("token_provider: true"));
        assert!(!debug.contains("secret"));
    }
}
