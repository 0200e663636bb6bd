//! Console Configuration
//!
//! Defines where the dashboard lives and how long progress observation may
//! take. Values are layered: defaults, then the TOML file, then environment
//! variables; the CLI applies its own flags last.

use crate::error::{ConsoleError, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Default dashboard URL
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5000";

/// Default bound on a whole progress observation (10 minutes)
pub const DEFAULT_OBSERVE_TIMEOUT_SECS: u64 = 600;

/// Default timeout for one-shot requests
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Complete console configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Dashboard base URL (http or https)
    pub base_url: String,
    /// WebSocket base URL; derived from `base_url` when unset
    pub ws_url: Option<String>,
    /// Bound on a progress observation in seconds, 0 disables the bound
    pub observe_timeout_secs: u64,
    /// Timeout for one-shot requests in seconds
    pub request_timeout_secs: u64,
    /// Zone to switch to before running an action
    pub zone: Option<String>,
    /// Dashboard session cookie value, sent on HTTP and WebSocket requests
    pub session: Option<String>,
    /// Follow several tasks over one multiplexed stream instead of one per task
    pub multiplex: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            ws_url: None,
            observe_timeout_secs: DEFAULT_OBSERVE_TIMEOUT_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            zone: None,
            session: None,
            multiplex: false,
        }
    }
}

impl ConsoleConfig {
    /// Defaults overridden by environment variables
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Apply `CITADEL_*` environment overrides on top of `self`
    pub fn with_env(mut self) -> Self {
        if let Ok(url) = std::env::var("CITADEL_URL") {
            self.base_url = url;
        }
        if let Ok(url) = std::env::var("CITADEL_WS_URL") {
            self.ws_url = Some(url);
        }
        if let Some(secs) = std::env::var("CITADEL_OBSERVE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.observe_timeout_secs = secs;
        }
        if let Some(secs) = std::env::var("CITADEL_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.request_timeout_secs = secs;
        }
        if let Ok(zone) = std::env::var("CITADEL_ZONE") {
            self.zone = Some(zone);
        }
        if let Ok(session) = std::env::var("CITADEL_SESSION") {
            self.session = Some(session);
        }
        if let Ok(v) = std::env::var("CITADEL_MULTIPLEX") {
            self.multiplex = v != "false" && v != "0";
        }
        self
    }

    /// Parse a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConsoleError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content).map_err(|e| {
            ConsoleError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    /// `<config dir>/citadel/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("citadel").join("config.toml"))
    }

    /// File at `path` (or the default path) if present, then environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).or_else(Self::default_path);
        let base = match path {
            Some(p) if p.exists() => {
                debug!("Loading console config from {}", p.display());
                Self::from_file(&p)?
            }
            _ => Self::default(),
        };
        Ok(base.with_env())
    }

    /// Parsed dashboard URL
    pub fn base_url(&self) -> Result<Url> {
        let url = Url::parse(&self.base_url).map_err(|e| {
            ConsoleError::Config(format!("Invalid base URL {}: {}", self.base_url, e))
        })?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(ConsoleError::Config(format!(
                "Base URL must be http or https, got {}",
                other
            ))),
        }
    }

    /// Parsed WebSocket URL: explicit `ws_url`, or `base_url` with http→ws, https→wss
    pub fn ws_url(&self) -> Result<Url> {
        if let Some(raw) = &self.ws_url {
            let url = Url::parse(raw).map_err(|e| {
                ConsoleError::Config(format!("Invalid WebSocket URL {}: {}", raw, e))
            })?;
            return match url.scheme() {
                "ws" | "wss" => Ok(url),
                other => Err(ConsoleError::Config(format!(
                    "WebSocket URL must be ws or wss, got {}",
                    other
                ))),
            };
        }

        let mut url = self.base_url()?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme).map_err(|_| {
            ConsoleError::Config(format!("Cannot derive WebSocket URL from {}", url))
        })?;
        Ok(url)
    }

    pub fn observe_timeout(&self) -> Option<Duration> {
        if self.observe_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.observe_timeout_secs))
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}
