// src/config.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::{env, fs};

pub const ENV_CONFIG_PATH: &str = "OPPSYNC_CONFIG_PATH";
pub const ENV_BASE_URL: &str = "OPPSYNC_BASE_URL";
pub const ENV_POLL_INTERVAL: &str = "OPPSYNC_POLL_INTERVAL_SECS";
pub const ENV_HIGHLIGHT_TTL: &str = "OPPSYNC_HIGHLIGHT_TTL_SECS";
pub const ENV_TOKEN: &str = "OPPSYNC_TOKEN";

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}
fn default_poll_interval_secs() -> u64 {
    40 * 60
}
fn default_highlight_ttl_secs() -> u64 {
    5 * 60
}
fn default_request_timeout_secs() -> u64 {
    10
}
fn default_connect_timeout_secs() -> u64 {
    4
}
fn default_listen_addr() -> String {
    "127.0.0.1:8088".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_highlight_ttl_secs")]
    pub highlight_ttl_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Bearer token. "ENV" means: read from OPPSYNC_TOKEN.
    #[serde(default)]
    pub token: Option<String>,
    /// Where `oppsync watch` serves the observer API.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            poll_interval_secs: default_poll_interval_secs(),
            highlight_ttl_secs: default_highlight_ttl_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            token: None,
            listen_addr: default_listen_addr(),
        }
    }
}

impl SyncConfig {
    /// Load from an explicit path. TOML or JSON, picked by extension.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let cfg = parse(&content, &ext)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(cfg.resolved()?.sanitized())
    }

    /// Load using env var + fallbacks:
    /// 1) $OPPSYNC_CONFIG_PATH
    /// 2) config/oppsync.toml
    /// 3) config/oppsync.json
    /// 4) built-in defaults
    ///
    /// Env overrides are applied last.
    pub fn load_default() -> Result<Self> {
        let base = if let Ok(p) = env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            Self::load_from(&pb)?
        } else if Path::new("config/oppsync.toml").exists() {
            Self::load_from(Path::new("config/oppsync.toml"))?
        } else if Path::new("config/oppsync.json").exists() {
            Self::load_from(Path::new("config/oppsync.json"))?
        } else {
            Self::default()
        };
        Ok(base.with_env_overrides()?.sanitized())
    }

    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(url) = env::var(ENV_BASE_URL) {
            self.base_url = url;
        }
        if let Ok(v) = env::var(ENV_POLL_INTERVAL) {
            self.poll_interval_secs = v
                .trim()
                .parse()
                .with_context(|| format!("{ENV_POLL_INTERVAL} must be a number of seconds"))?;
        }
        if let Ok(v) = env::var(ENV_HIGHLIGHT_TTL) {
            self.highlight_ttl_secs = v
                .trim()
                .parse()
                .with_context(|| format!("{ENV_HIGHLIGHT_TTL} must be a number of seconds"))?;
        }
        if let Ok(t) = env::var(ENV_TOKEN) {
            self.token = Some(t);
        }
        Ok(self)
    }

    fn resolved(mut self) -> Result<Self> {
        if self
            .token
            .as_deref()
            .is_some_and(|t| t.trim().eq_ignore_ascii_case("env"))
        {
            self.token = Some(
                env::var(ENV_TOKEN).map_err(|_| anyhow!("Missing {ENV_TOKEN} env var"))?,
            );
        }
        Ok(self)
    }

    fn sanitized(mut self) -> Self {
        self.base_url = self.base_url.trim().trim_end_matches('/').to_string();
        if self.base_url.is_empty() {
            self.base_url = default_base_url();
        }
        if self.poll_interval_secs == 0 {
            self.poll_interval_secs = default_poll_interval_secs();
        }
        if self.highlight_ttl_secs == 0 {
            self.highlight_ttl_secs = default_highlight_ttl_secs();
        }
        if self.request_timeout_secs == 0 {
            self.request_timeout_secs = default_request_timeout_secs();
        }
        if self.connect_timeout_secs == 0 {
            self.connect_timeout_secs = default_connect_timeout_secs();
        }
        self.token = self.token.filter(|t| !t.trim().is_empty());
        self
    }
}

fn parse(s: &str, hint_ext: &str) -> Result<SyncConfig> {
    match hint_ext {
        "toml" => Ok(toml::from_str(s)?),
        "json" => Ok(serde_json::from_str(s)?),
        // Unknown extension: try JSON, then TOML.
        _ => serde_json::from_str(s)
            .map_err(anyhow::Error::from)
            .or_else(|_| toml::from_str(s).map_err(anyhow::Error::from))
            .map_err(|_| anyhow!("unsupported config format")),
    }
}
