//! Ferry configuration.
//!
//! Stored as TOML, by default at:
//! - Linux: `~/.config/ferry/ferry.toml`
//! - Windows: `%APPDATA%/ferry/ferry.toml`
//!
//! Every field is optional; command-line flags override file values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use ferry_client::RetryPolicy;
use ferry_protocol::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_PAYLOAD, DEFAULT_PORT};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub client: ClientSection,
}

/// `[server]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    /// Address to listen on.
    #[serde(default = "default_bind")]
    pub bind: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory receiving `<client_id>/<file_name>` uploads.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Refuse a second live connection writing the same destination.
    #[serde(default)]
    pub exclusive_paths: bool,

    /// Largest accepted `DATA` payload in bytes.
    #[serde(default = "default_max_payload")]
    pub max_payload: usize,
}

/// `[client]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSection {
    /// Identity presented to servers (hostname by default).
    #[serde(default = "default_client_id")]
    pub client_id: String,

    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Delay before the first reconnect.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Backoff cap; equal to `retry_delay_ms` for a fixed delay.
    #[serde(default = "default_retry_delay_ms")]
    pub max_retry_delay_ms: u64,

    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,

    /// Consecutive failures before giving up (unbounded when absent).
    #[serde(default)]
    pub max_attempts: Option<u32>,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_bind() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_max_payload() -> usize {
    DEFAULT_MAX_PAYLOAD
}

fn default_client_id() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .map(|h| h.split_whitespace().collect::<String>())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "ferry-client".into())
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_backoff_factor() -> f64 {
    1.0
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            root: default_root(),
            exclusive_paths: false,
            max_payload: default_max_payload(),
        }
    }
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            client_id: default_client_id(),
            chunk_size: default_chunk_size(),
            retry_delay_ms: default_retry_delay_ms(),
            max_retry_delay_ms: default_retry_delay_ms(),
            backoff_factor: default_backoff_factor(),
            max_attempts: None,
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl ClientSection {
    pub fn retry_policy(&self) -> RetryPolicy {
        let initial_delay = Duration::from_millis(self.retry_delay_ms);
        RetryPolicy {
            initial_delay,
            max_delay: Duration::from_millis(self.max_retry_delay_ms).max(initial_delay),
            backoff_factor: self.backoff_factor.max(1.0),
            max_attempts: self.max_attempts,
            jitter: self.backoff_factor > 1.0,
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Config {
    /// Loads configuration.
    ///
    /// An explicit path must exist. Without one, the default location is
    /// read when present and built-in defaults apply otherwise.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }

        match config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }
}

/// Returns the platform-specific configuration file path.
fn config_path() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|dir| PathBuf::from(dir).join("ferry").join("ferry.toml"))
    }

    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("HOME").map(|home| {
            PathBuf::from(home)
                .join(".config")
                .join("ferry")
                .join("ferry.toml")
        })
    }
}
