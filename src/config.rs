//! Bridge configuration: TOML file, environment overrides, and validation.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

/// Environment variable overriding [`BridgeConfig::http_port`].
pub const ENV_PORT: &str = "PORT";
/// Environment variable overriding [`BridgeConfig::memory_dir`].
///
/// The same variable name is exported to the server process.
pub const ENV_MEMORY_DIR: &str = "MEMORY_DIR";
/// Environment variable overriding [`BridgeConfig::server_path`].
pub const ENV_SERVER_PATH: &str = "MCP_SERVER_PATH";

/// Timeout values for request correlation and process supervision.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TimeoutConfig {
    /// Window a request waits for its response.
    #[serde(default = "default_request_seconds")]
    pub request_seconds: u64,
    /// Delay between a server exit and the next launch.
    #[serde(default = "default_restart_backoff_ms")]
    pub restart_backoff_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_seconds: default_request_seconds(),
            restart_backoff_ms: default_restart_backoff_ms(),
        }
    }
}

impl TimeoutConfig {
    /// Correlation window as a [`Duration`].
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_seconds)
    }

    /// Restart backoff as a [`Duration`].
    #[must_use]
    pub fn restart_backoff(&self) -> Duration {
        Duration::from_millis(self.restart_backoff_ms)
    }
}

fn default_request_seconds() -> u64 {
    5
}

fn default_restart_backoff_ms() -> u64 {
    1000
}

fn default_http_host() -> String {
    "0.0.0.0".into()
}

fn default_http_port() -> u16 {
    8001
}

fn default_memory_dir() -> PathBuf {
    PathBuf::from("/vault")
}

fn default_server_path() -> PathBuf {
    PathBuf::from("obsidian-memory-mcp")
}

fn default_server_command() -> String {
    "node".into()
}

fn default_server_args() -> Vec<String> {
    vec!["dist/index.js".into()]
}

fn default_client_name() -> String {
    "brainos-http-wrapper".into()
}

/// Global bridge configuration.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BridgeConfig {
    /// Interface the HTTP listener binds to.
    #[serde(default = "default_http_host")]
    pub http_host: String,
    /// HTTP listen port; `0` lets the OS pick one.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Vault directory handed to the server process as `MEMORY_DIR`.
    #[serde(default = "default_memory_dir")]
    pub memory_dir: PathBuf,
    /// Working directory of the server process.
    #[serde(default = "default_server_path")]
    pub server_path: PathBuf,
    /// Server executable.
    #[serde(default = "default_server_command")]
    pub server_command: String,
    /// Arguments passed to [`BridgeConfig::server_command`].
    #[serde(default = "default_server_args")]
    pub server_args: Vec<String>,
    /// `clientInfo.name` announced during the handshake.
    #[serde(default = "default_client_name")]
    pub client_name: String,
    /// Correlation and restart timings.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            http_host: default_http_host(),
            http_port: default_http_port(),
            memory_dir: default_memory_dir(),
            server_path: default_server_path(),
            server_command: default_server_command(),
            server_args: default_server_args(),
            client_name: default_client_name(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

impl BridgeConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `PORT`, `MEMORY_DIR` and `MCP_SERVER_PATH` overrides.
    ///
    /// `lookup` resolves a variable name to its value; pass
    /// `|key| std::env::var(key).ok()` for the process environment.
    /// Empty values are ignored.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `PORT` is not a valid port number.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(port) = lookup(ENV_PORT) {
            self.http_port = port
                .trim()
                .parse()
                .map_err(|err| AppError::Config(format!("{ENV_PORT}={port} is invalid: {err}")))?;
        }
        if let Some(dir) = lookup(ENV_MEMORY_DIR) {
            self.memory_dir = PathBuf::from(dir);
        }
        if let Some(path) = lookup(ENV_SERVER_PATH) {
            self.server_path = PathBuf::from(path);
        }
        self.validate()
    }

    fn validate(&self) -> Result<()> {
        if self.server_command.trim().is_empty() {
            return Err(AppError::Config("server_command must not be empty".into()));
        }

        if self.timeouts.request_seconds == 0 {
            return Err(AppError::Config(
                "timeouts.request_seconds must be greater than zero".into(),
            ));
        }

        if self.client_name.trim().is_empty() {
            return Err(AppError::Config("client_name must not be empty".into()));
        }

        Ok(())
    }
}
