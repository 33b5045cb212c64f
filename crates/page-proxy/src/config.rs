use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Env var overriding `server.port`.
pub const PORT_ENV: &str = "MTL_NOTION_PORT";
/// Env var overriding `cors.origin`.
pub const CORS_HOST_ENV: &str = "MTL_NOTION_CORS_HOST";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub cors: CorsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Prometheus exporter address. Disabled when unset.
    #[serde(default)]
    pub metrics_addr: Option<String>,
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_upstream_url")]
    pub url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_chunk_limit")]
    pub chunk_limit: u32,
    /// Upper bound on `loadPageChunk` round trips for one page.
    #[serde(default = "default_max_chunks")]
    pub max_chunks: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,
    #[serde(default = "default_max_body_size")]
    pub max_body_size_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    /// `*` for any origin, otherwise one or more comma-separated origins.
    #[serde(default = "default_cors_origin")]
    pub origin: String,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Apply env overrides using `lookup` (normally `std::env::var`).
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup(PORT_ENV).filter(|v| !v.trim().is_empty()) {
            self.server.port = port.trim().parse().map_err(|_| ConfigError::Invalid {
                field: PORT_ENV,
                reason: format!("{port:?} is not a port number"),
            })?;
        }
        if let Some(origin) = lookup(CORS_HOST_ENV).filter(|v| !v.trim().is_empty()) {
            self.cors.origin = origin;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "cache.capacity",
                reason: "must be > 0".into(),
            });
        }
        if self.cache.ttl_seconds == 0 {
            return Err(ConfigError::Invalid {
                field: "cache.ttl_seconds",
                reason: "must be > 0".into(),
            });
        }
        if self.upstream.max_chunks == 0 {
            return Err(ConfigError::Invalid {
                field: "upstream.max_chunks",
                reason: "must be > 0".into(),
            });
        }
        if let Err(e) = self.cors.allowed_origins() {
            return Err(ConfigError::Invalid {
                field: "cors.origin",
                reason: e,
            });
        }
        self.listen_addr()?;
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| ConfigError::Invalid {
                field: "server.host",
                reason: format!("{e}"),
            })
    }
}

impl ServerConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

impl CorsConfig {
    /// `None` means any origin; otherwise the explicit list.
    pub fn allowed_origins(&self) -> Result<Option<Vec<String>>, String> {
        let origin = self.origin.trim();
        if origin == "*" {
            return Ok(None);
        }
        let origins: Vec<String> = origin
            .split(',')
            .map(|o| o.trim())
            .filter(|o| !o.is_empty())
            .map(str::to_string)
            .collect();
        if origins.is_empty() {
            return Err("no origin given".into());
        }
        // A wildcard anywhere in the list already admits every origin.
        if origins.iter().any(|o| o == "*") {
            return Ok(None);
        }
        for o in &origins {
            if o.contains(char::is_whitespace) || !o.is_ascii() {
                return Err(format!("{o:?} is not a valid origin"));
            }
        }
        Ok(Some(origins))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            metrics_addr: None,
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: default_upstream_url(),
            timeout_ms: default_timeout_ms(),
            chunk_limit: default_chunk_limit(),
            max_chunks: default_max_chunks(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            ttl_seconds: default_ttl(),
            max_body_size_bytes: default_max_body_size(),
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            origin: default_cors_origin(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8002
}
fn default_shutdown_grace_ms() -> u64 {
    5000
}
fn default_upstream_url() -> String {
    "https://www.notion.so".to_string()
}
fn default_timeout_ms() -> u64 {
    10_000
}
fn default_chunk_limit() -> u32 {
    100
}
fn default_max_chunks() -> u32 {
    100
}
fn default_capacity() -> usize {
    10000
}
fn default_ttl() -> u64 {
    60
}
fn default_max_body_size() -> usize {
    8 * 1024 * 1024
}
fn default_cors_origin() -> String {
    "*".to_string()
}
