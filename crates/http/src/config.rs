//! Environment-driven server configuration.
//!
//! Unset variables fall back to defaults; malformed values are logged and
//! ignored rather than failing startup.

use std::str::FromStr;
use std::time::Duration;

use relay_core::{LaunchOptions, PoolConfig, Viewport};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cdp_url: String,
    pub max_sessions: usize,
    pub session_timeout: Duration,
    pub default_headless: bool,
    pub default_viewport: Viewport,
    pub proxy_server: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cdp_url: "ws://localhost:9222/devtools/browser".to_string(),
            max_sessions: 10,
            session_timeout: Duration::from_secs(3600),
            default_headless: true,
            default_viewport: Viewport::default(),
            proxy_server: None,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: env_string("HTTP_HOST", defaults.host),
            port: env_parse("HTTP_PORT", defaults.port),
            cdp_url: env_string("CDP_URL", defaults.cdp_url),
            max_sessions: env_parse("MAX_SESSIONS", defaults.max_sessions),
            session_timeout: Duration::from_secs(env_parse("SESSION_TIMEOUT", 3600)),
            default_headless: env_bool("DEFAULT_HEADLESS", defaults.default_headless),
            default_viewport: Viewport {
                width: env_parse("DEFAULT_WIDTH", defaults.default_viewport.width),
                height: env_parse("DEFAULT_HEIGHT", defaults.default_viewport.height),
            },
            proxy_server: std::env::var("PROXY_SERVER").ok().filter(|v| !v.is_empty()),
        }
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_sessions: self.max_sessions,
            session_timeout: self.session_timeout,
            defaults: LaunchOptions {
                headless: self.default_headless,
                viewport: self.default_viewport,
                user_agent: None,
                proxy: self.proxy_server.clone(),
            },
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_string(key: &str, default: String) -> String {
    std::env::var(key)
        .ok()
        .filter(|value| !value.is_empty())
        .unwrap_or(default)
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(key, "ignoring malformed value: {err}");
                default
            }
        },
        Err(_) => default,
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(raw) => matches!(raw.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_knobs() {
        let config = ServerConfig::default();
        assert_eq!(config.max_sessions, 10);
        assert_eq!(config.session_timeout, Duration::from_secs(3600));
        assert!(config.default_headless);
        assert_eq!(config.default_viewport.width, 1920);
        assert_eq!(config.default_viewport.height, 1080);
    }

    #[test]
    fn malformed_numbers_fall_back() {
        std::env::set_var("RELAY_TEST_BAD_PORT", "not-a-port");
        assert_eq!(env_parse("RELAY_TEST_BAD_PORT", 8000u16), 8000);
        std::env::remove_var("RELAY_TEST_BAD_PORT");
    }

    #[test]
    fn booleans_accept_the_usual_spellings() {
        std::env::set_var("RELAY_TEST_FLAG", "YES");
        assert!(env_bool("RELAY_TEST_FLAG", false));
        std::env::set_var("RELAY_TEST_FLAG", "0");
        assert!(!env_bool("RELAY_TEST_FLAG", true));
        std::env::remove_var("RELAY_TEST_FLAG");
    }
}
