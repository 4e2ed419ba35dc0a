//! Process configuration, loaded from the environment.
//!
//! Every knob comes from an environment variable (a `.env` file is honored
//! via `dotenvy` before loading). All values are validated up front so the
//! server never starts with a broken cache capacity or missing upstream
//! credentials.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ParakeetError, Result};

/// Default bounded-cache capacity (entries).
pub const DEFAULT_CACHE_CAPACITY: usize = 150_000;

/// Default per-fragment upstream idle timeout (seconds). `0` disables it.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub bind: String,
    /// Listen port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Upstream completion API configuration (OpenAI-compatible).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of the chat-completions API, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    /// API key sent as a bearer token. Never logged.
    #[serde(skip_serializing)]
    pub api_key: String,
    /// Model name passed through on every completion request.
    pub model: String,
}

/// Bounded answer cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of resident entries. Must be at least 1.
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

/// Streaming relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Seconds to wait for the next upstream fragment before failing the
    /// in-flight fetch. `0` disables the timeout.
    pub idle_timeout_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
        }
    }
}

impl RelayConfig {
    /// Idle timeout as a `Duration`, or `None` when disabled.
    pub fn idle_timeout(&self) -> Option<Duration> {
        if self.idle_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.idle_timeout_secs))
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub cache: CacheConfig,
    pub relay: RelayConfig,
}

impl Config {
    /// Load configuration from the process environment and validate it.
    pub fn load() -> Result<Self> {
        let mut config = Config::default();

        if let Some(port) = read_env("APP_PORT") {
            config.server.port = port
                .parse()
                .map_err(|_| ParakeetError::Config(format!("invalid APP_PORT: {port}")))?;
        }
        if let Some(bind) = read_env("APP_BIND") {
            config.server.bind = bind;
        }
        if let Some(url) = read_env("OPENAI_SITE_URL") {
            config.upstream.base_url = url;
        }
        if let Some(key) = read_env("OPENAI_API_KEY") {
            config.upstream.api_key = key;
        }
        if let Some(model) = read_env("OPENAI_MODEL") {
            config.upstream.model = model;
        }
        if let Some(capacity) = read_env("CACHE_CAPACITY") {
            config.cache.capacity = capacity
                .parse()
                .map_err(|_| ParakeetError::Config(format!("invalid CACHE_CAPACITY: {capacity}")))?;
        }
        if let Some(secs) = read_env("RELAY_IDLE_TIMEOUT_SECS") {
            config.relay.idle_timeout_secs = secs.parse().map_err(|_| {
                ParakeetError::Config(format!("invalid RELAY_IDLE_TIMEOUT_SECS: {secs}"))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check invariants that would otherwise surface as runtime failures.
    pub fn validate(&self) -> Result<()> {
        if self.cache.capacity < 1 {
            return Err(ParakeetError::Config(
                "cache capacity must be at least 1".into(),
            ));
        }
        if self.upstream.base_url.is_empty() {
            return Err(ParakeetError::Config("OPENAI_SITE_URL is not set".into()));
        }
        if self.upstream.api_key.is_empty() {
            return Err(ParakeetError::Config("OPENAI_API_KEY is not set".into()));
        }
        if self.upstream.model.is_empty() {
            return Err(ParakeetError::Config("OPENAI_MODEL is not set".into()));
        }
        Ok(())
    }
}

/// Read an environment variable, treating empty values as unset.
fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
