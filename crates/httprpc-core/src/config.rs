//! Centralized configuration for the HTTP-RPC client.
//!
//! Constant tables live on unit structs; [`ProxyConfig`] carries the values a
//! caller may change per proxy.

use std::time::Duration;

/// Transport-level constants.
pub struct TransportConfig;

impl TransportConfig {
    /// Default number of requests allowed in flight at once.
    pub const MAX_CONCURRENT_REQUESTS: usize = 10;
    /// Hard cap on authentication round trips for a single invocation.
    pub const MAX_CHALLENGE_ROUNDS: u32 = 3;
    /// Chunk size for streaming attachment uploads (64 KB).
    pub const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;
    pub const USER_AGENT: &'static str = concat!("httprpc-rs/", env!("CARGO_PKG_VERSION"));
    /// Longest error description kept from a plain-text error body.
    pub const ERROR_DESCRIPTION_MAX_LEN: usize = 256;
    pub const DEFAULT_ACCEPT_LANGUAGE: &'static str = "en-us";
    pub const DEFAULT_CONTENT_TYPE: &'static str = "application/octet-stream";
}

/// Per-proxy configuration.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Maximum number of simultaneously active requests.
    pub max_concurrent_requests: usize,
    /// Timeout applied to each call unless overridden. `None` waits forever.
    pub request_timeout: Option<Duration>,
    /// Timeout for establishing connections. `None` uses the OS default.
    pub connect_timeout: Option<Duration>,
    /// Value of the `Accept-Language` request header.
    pub accept_language: String,
    pub user_agent: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: TransportConfig::MAX_CONCURRENT_REQUESTS,
            request_timeout: None,
            connect_timeout: None,
            accept_language: default_accept_language(),
            user_agent: TransportConfig::USER_AGENT.to_string(),
        }
    }
}

/// Derive an `Accept-Language` tag from the process locale.
///
/// Reads `LC_ALL`, then `LANG`, and turns `en_US.UTF-8` into `en-us`.
pub fn default_accept_language() -> String {
    ["LC_ALL", "LANG"]
        .iter()
        .filter_map(|key| std::env::var(key).ok())
        .find_map(|locale| locale_to_language_tag(&locale))
        .unwrap_or_else(|| TransportConfig::DEFAULT_ACCEPT_LANGUAGE.to_string())
}

/// Convert a POSIX locale name to a lowercase language tag.
///
/// Returns `None` for empty values and the `C`/`POSIX` locales.
pub fn locale_to_language_tag(locale: &str) -> Option<String> {
    let name = locale
        .split(['.', '@'])
        .next()
        .unwrap_or_default()
        .trim();

    if name.is_empty() || name == "C" || name == "POSIX" {
        return None;
    }

    Some(name.replace('_', "-").to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locale_to_language_tag() {
        assert_eq!(locale_to_language_tag("en_US.UTF-8"), Some("en-us".into()));
        assert_eq!(locale_to_language_tag("de_DE@euro"), Some("de-de".into()));
        assert_eq!(locale_to_language_tag("fr"), Some("fr".into()));
        assert_eq!(locale_to_language_tag("C"), None);
        assert_eq!(locale_to_language_tag("POSIX"), None);
        assert_eq!(locale_to_language_tag(""), None);
    }

    #[test]
    fn test_defaults_are_reasonable() {
        let config = ProxyConfig::default();
        assert_eq!(config.max_concurrent_requests, 10);
        assert!(config.request_timeout.is_none());
        assert!(!config.accept_language.is_empty());
        assert!(TransportConfig::MAX_CHALLENGE_ROUNDS >= 2);
    }
}
