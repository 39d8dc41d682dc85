//! Client configuration, resolved once at startup.

use std::path::PathBuf;

use anyhow::{Result, bail};

/// Where chat requests go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Through coach-proxy, which holds the credential.
    Proxy { url: String },
    /// Straight to the model API with a local credential. For development.
    Direct { url: String, api_key: String },
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoint: Endpoint,
    /// `None` leaves the choice to the proxy.
    pub model: Option<String>,
    /// Ask for a live token stream instead of one buffered reply.
    pub stream: bool,
    /// Directory holding the persisted transcript and profile.
    pub data_dir: PathBuf,
    pub log_file: PathBuf,
}

impl ClientConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let flag = |key: &str, default: bool| {
            get(key)
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(default)
        };
        let direct = flag("COACH_DIRECT", false);

        let endpoint = if direct {
            let Some(api_key) = get("DEEPSEEK_API_KEY").or_else(|| get("VITE_DEEPSEEK_API_KEY")) else {
                bail!("COACH_DIRECT is set but DEEPSEEK_API_KEY is missing");
            };
            let base = get("COACH_UPSTREAM_URL").unwrap_or_else(|| "https://api.deepseek.com".into());
            Endpoint::Direct {
                url: format!("{}/chat/completions", base.trim_end_matches('/')),
                api_key: api_key.trim().to_owned(),
            }
        } else {
            Endpoint::Proxy {
                url: get("COACH_PROXY_URL").unwrap_or_else(|| "http://127.0.0.1:8888/chat".into()),
            }
        };

        Ok(Self {
            endpoint,
            model: get("COACH_MODEL"),
            stream: flag("COACH_STREAM", true),
            data_dir: PathBuf::from(get("COACH_DATA_DIR").unwrap_or_else(|| ".coach".into())),
            log_file: PathBuf::from(get("COACH_LOG_FILE").unwrap_or_else(|| "coach-cli.log".into())),
        })
    }
}
