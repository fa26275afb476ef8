//! Error types shared across the application.

use std::fmt::{Display, Formatter};
use std::time::Duration;

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all bridge failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// No response arrived for a request within the correlation window.
    Timeout {
        /// JSON-RPC method of the request that timed out.
        method: String,
        /// Window the caller waited for.
        after: Duration,
    },
    /// No live server process, or the process was replaced mid-request.
    Disconnected(String),
    /// The server process could not be launched.
    Spawn(String),
    /// The `initialize` handshake did not complete.
    Bootstrap(String),
    /// Framing or serialisation failure on the stdio stream.
    Protocol(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Timeout { method, after } => write!(
                f,
                "MCP request timeout: '{method}' received no response within {after:?}"
            ),
            Self::Disconnected(msg) => write!(f, "disconnected: {msg}"),
            Self::Spawn(msg) => write!(f, "spawn: {msg}"),
            Self::Bootstrap(msg) => write!(f, "bootstrap: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
