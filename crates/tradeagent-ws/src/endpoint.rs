//! Endpoint resolution from a connection template.

use crate::config::ConnectionConfig;

/// Subject used when no provider is configured or it returns nothing.
pub const DEFAULT_SUBJECT: &str = "default_user";

/// Recognised subject placeholders.
pub const SUBJECT_PLACEHOLDERS: [&str; 2] = ["{subject_id}", "{user_id}"];

const TOKEN_PARAM: &str = "token";

/// Resolve the final endpoint for the next connection attempt.
///
/// Providers are called on every resolution so that a refreshed token is
/// picked up by reconnects.
pub fn resolve_endpoint(config: &ConnectionConfig) -> String {
    let subject = config.subject_provider.as_ref().and_then(|p| p());
    let token = config.token_provider.as_ref().and_then(|p| p());
    resolve(&config.endpoint_template, subject.as_deref(), token.as_deref())
}

/// Substitute the subject and append the token query parameter.
pub fn resolve(template: &str, subject: Option<&str>, token: Option<&str>) -> String {
    let subject = subject.unwrap_or(DEFAULT_SUBJECT);
    let mut endpoint = SUBJECT_PLACEHOLDERS
        .iter()
        .fold(template.to_string(), |acc, placeholder| {
            acc.replacen(placeholder, subject, 1)
        });

    if let Some(token) = token.filter(|t| !t.is_empty()) {
        let separator = if endpoint.contains('?') { '&' } else { '?' };
        endpoint.push(separator);
        endpoint.push_str(TOKEN_PARAM);
        endpoint.push('=');
        endpoint.push_str(token);
    }

    endpoint
}

/// Mask the token query parameter value for logging.
pub fn redact(endpoint: &str) -> String {
    let Some(query_start) = endpoint.find('?') else {
        return endpoint.to_string();
    };
    let (base, query) = endpoint.split_at(query_start + 1);
    let masked: Vec<String> = query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((key, _)) if key == TOKEN_PARAM => format!("{key}=***"),
            _ => pair.to_string(),
        })
        .collect();
    format!("{base}{}", masked.join("&"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE: &str = "wss://host/ws/{subject_id}";

    #[test]
    fn test_resolve_subject_and_token() {
        let config = ConnectionConfig::new(TEMPLATE)
            .with_subject_provider(|| Some("42".to_string()))
            .with_token_provider(|| Some("tok".to_string()));
        assert_eq!(resolve_endpoint(&config), "wss://host/ws/42?token=tok");
    }

    #[test]
    fn test_resolve_without_token_provider() {
        let config = ConnectionConfig::new(TEMPLATE).with_subject_provider(|| Some("42".to_string()));
        assert_eq!(resolve_endpoint(&config), "wss://host/ws/42");
    }

    #[test]
    fn test_resolve_without_subject_provider() {
        let config = ConnectionConfig::new(TEMPLATE);
        assert_eq!(resolve_endpoint(&config), "wss://host/ws/default_user");
    }

    #[test]
    fn test_provider_returning_none_falls_back() {
        let config = ConnectionConfig::new(TEMPLATE)
            .with_subject_provider(|| None)
            .with_token_provider(|| None);
        assert_eq!(resolve_endpoint(&config), "wss://host/ws/default_user");
    }

    #[test]
    fn test_existing_query_uses_ampersand() {
        let endpoint = resolve("ws://host/ws/{user_id}?v=2", Some("7"), Some("abc"));
        assert_eq!(endpoint, "ws://host/ws/7?v=2&token=abc");
    }

    #[test]
    fn test_empty_token_not_appended() {
        assert_eq!(resolve(TEMPLATE, Some("1"), Some("")), "wss://host/ws/1");
    }

    #[test]
    fn test_only_first_placeholder_replaced() {
        let endpoint = resolve("ws://h/{subject_id}/{subject_id}", Some("a"), None);
        assert_eq!(endpoint, "ws://h/a/{subject_id}");
    }

    #[test]
    fn test_providers_called_per_resolution() {
        use std::sync::atomic::{AtomicU32, Ordering};
        use std::sync::Arc;

        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let config = ConnectionConfig::new(TEMPLATE).with_token_provider(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            Some(format!("t{n}"))
        });

        assert_eq!(resolve_endpoint(&config), "wss://host/ws/default_user?token=t1");
        assert_eq!(resolve_endpoint(&config), "wss://host/ws/default_user?token=t2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_redact_token() {
        assert_eq!(
            redact("wss://host/ws/42?v=2&token=secret"),
            "wss://host/ws/42?v=2&token=***"
        );
        assert_eq!(redact("wss://host/ws/42"), "wss://host/ws/42");
    }
}
