//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.reagent/config.json`) and environment.
//! The backend base URL is the only required setting; both REST and live-connection
//! endpoints are derived from it.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Environment override for the backend base URL.
pub const API_URL_ENV: &str = "REAGENT_API_URL";

/// Environment override for the config file path.
pub const CONFIG_PATH_ENV: &str = "REAGENT_CONFIG_PATH";

const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Backend location.
    #[serde(default)]
    pub api: ApiConfig,

    /// Live connection behaviour.
    #[serde(default)]
    pub connection: ConnectionConfig,
}

/// Backend REST + live connection location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiConfig {
    /// Base URL of the agent backend (default http://localhost:8000). Overridden by REAGENT_API_URL env.
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConfig {
    /// What happens when the live connection closes without the user asking for it.
    #[serde(default)]
    pub reconnect: ReconnectMode,
}

/// Reconnection behaviour after an unrequested close.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "mode")]
pub enum ReconnectMode {
    /// Stay disconnected; a reconnect happens only when the selected session changes or the user retries.
    #[default]
    Manual,
    /// Retry with a fixed delay up to a fixed number of attempts.
    Auto(ReconnectPolicy),
}

/// Bounded fixed-delay retry budget (not exponential).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconnectPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_delay_ms() -> u64 {
    3000
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_delay_ms(),
        }
    }
}

impl ReconnectPolicy {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("invalid base url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("unsupported scheme {0:?} in base url (expected http or https)")]
    UnsupportedScheme(String),
}

/// Resolved backend endpoints: REST base and live-connection base (same host, ws/wss scheme).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    http_base: String,
    ws_base: String,
}

impl Endpoints {
    /// Derive endpoints from a base URL by protocol substitution (http → ws, https → wss).
    pub fn from_base_url(base_url: &str) -> Result<Self, EndpointError> {
        let trimmed = base_url.trim().trim_end_matches('/');
        let parsed = reqwest::Url::parse(trimmed).map_err(|e| EndpointError::InvalidUrl {
            url: trimmed.to_string(),
            reason: e.to_string(),
        })?;
        let ws_scheme = match parsed.scheme() {
            "http" => "ws",
            "https" => "wss",
            other => return Err(EndpointError::UnsupportedScheme(other.to_string())),
        };
        let rest = &trimmed[parsed.scheme().len()..];
        Ok(Self {
            http_base: trimmed.to_string(),
            ws_base: format!("{}{}", ws_scheme, rest),
        })
    }

    /// REST endpoint for a path under `/api` (path starts with `/`).
    pub fn api(&self, path: &str) -> String {
        format!("{}/api{}", self.http_base, path)
    }

    /// Live endpoint for a session. `None` targets the endpoint that allocates a new session.
    pub fn live(&self, session_id: Option<&str>) -> String {
        match session_id {
            Some(id) => format!("{}/api/ws/{}", self.ws_base, urlencoding::encode(id)),
            None => format!("{}/api/ws", self.ws_base),
        }
    }
}

/// Resolve the base URL: env REAGENT_API_URL overrides config.
pub fn resolve_base_url(config: &Config) -> String {
    std::env::var(API_URL_ENV)
        .ok()
        .and_then(|s| {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        })
        .unwrap_or_else(|| config.api.base_url.trim().to_string())
}

/// Resolve endpoints for the configured backend (env override applied).
pub fn resolve_endpoints(config: &Config) -> Result<Endpoints, EndpointError> {
    Endpoints::from_base_url(&resolve_base_url(config))
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var(CONFIG_PATH_ENV).map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".reagent").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Load config from the default path (or REAGENT_CONFIG_PATH). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}
