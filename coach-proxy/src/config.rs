//! Proxy configuration, loaded from environment variables at startup.

use std::time::Duration;

use coach_shared::DEFAULT_MODEL;

use crate::retry::RetryPolicy;

/// Environment variables searched for the upstream credential, in order.
pub const CREDENTIAL_VARS: [&str; 2] = ["DEEPSEEK_API_KEY", "VITE_DEEPSEEK_API_KEY"];

#[derive(Debug, Clone)]
pub struct Config {
    /// TCP address to bind (default: `"127.0.0.1:8888"`).
    pub bind_address: String,

    /// Base URL of the model API; `/chat/completions` is appended.
    pub upstream_url: String,

    /// Bearer token for the upstream. `None` makes every chat request fail
    /// with 500 rather than going upstream unauthenticated.
    pub credential: Option<String>,

    /// Model used when a request does not name one.
    pub default_model: String,

    /// Response mode for requests that omit `stream`.
    pub default_stream: bool,

    pub retry: RetryPolicy,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,

    /// Emit log records as newline-delimited JSON.
    pub log_json: bool,
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = RetryPolicy::default();
        Self {
            bind_address: env_or("COACH_BIND", "127.0.0.1:8888"),
            upstream_url: env_or("COACH_UPSTREAM_URL", "https://api.deepseek.com"),
            credential: resolve_credential(|key| std::env::var(key).ok()),
            default_model: env_or("COACH_DEFAULT_MODEL", DEFAULT_MODEL),
            default_stream: parse_flag("COACH_DEFAULT_STREAM"),
            retry: RetryPolicy {
                max_attempts: parse_env("COACH_MAX_RETRIES", defaults.max_attempts).max(1),
                delay: Duration::from_millis(parse_env(
                    "COACH_RETRY_DELAY_MS",
                    defaults.delay.as_millis() as u64,
                )),
            },
            log_level: env_or("COACH_LOG", "info"),
            log_json: parse_flag("COACH_LOG_JSON"),
        }
    }
}

/// First non-blank value among [`CREDENTIAL_VARS`].
pub fn resolve_credential(lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    CREDENTIAL_VARS
        .iter()
        .filter_map(|key| lookup(key))
        .map(|value| value.trim().to_owned())
        .find(|value| !value.is_empty())
}

// ── private helpers ──────────────────────────────────────────────────────────

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_flag(key: &str) -> bool {
    std::env::var(key)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}
