//! Client configuration
//!
//! Resolved as: explicit overrides > `REVIEWDOCK_*` env > TOML file > defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

pub const DEFAULT_SERVER_URL: &str = "http://localhost:8000";
pub const DEFAULT_ENDPOINT_PATH: &str = "/ws/analyze";
const DEFAULT_SNAPSHOT_CAPACITY: usize = 256;

pub const ENV_SERVER_URL: &str = "REVIEWDOCK_SERVER_URL";
pub const ENV_ENDPOINT_PATH: &str = "REVIEWDOCK_ENDPOINT_PATH";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid server URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Origin of the analysis server (`http(s)://` or `ws(s)://`)
    pub server_url: String,
    /// Path of the analysis WebSocket on that server
    pub endpoint_path: String,
    /// How many unread snapshots an observer may fall behind
    pub snapshot_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            endpoint_path: DEFAULT_ENDPOINT_PATH.to_string(),
            snapshot_capacity: DEFAULT_SNAPSHOT_CAPACITY,
        }
    }
}

impl ClientConfig {
    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default())
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `REVIEWDOCK_*` environment overrides.
    pub fn with_env(self) -> Self {
        self.with_vars(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable source.
    pub fn with_vars(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| var(key).filter(|v| !v.trim().is_empty());
        if let Some(url) = non_empty(ENV_SERVER_URL) {
            self.server_url = url;
        }
        if let Some(path) = non_empty(ENV_ENDPOINT_PATH) {
            self.endpoint_path = path;
        }
        self
    }

    /// WebSocket URL of the analysis endpoint.
    ///
    /// The scheme mirrors the server's security context: `https` maps to
    /// `wss`, `http` to `ws`.
    pub fn endpoint_url(&self) -> Result<String, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidUrl {
            url: self.server_url.clone(),
            reason: reason.to_string(),
        };

        let mut url = Url::parse(self.server_url.trim()).map_err(|e| invalid(&e.to_string()))?;
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            _ => return Err(invalid("scheme must be http, https, ws or wss")),
        };
        url.set_scheme(scheme)
            .map_err(|_| invalid("cannot switch to a WebSocket scheme"))?;

        let path = self.endpoint_path.trim();
        if path.starts_with('/') {
            url.set_path(path);
        } else {
            url.set_path(&format!("/{path}"));
        }
        url.set_query(None);
        url.set_fragment(None);

        Ok(url.to_string())
    }
}
