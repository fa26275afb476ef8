#![forbid(unsafe_code)]

//! HTTP bridge for stdio-only MCP servers.
//!
//! Spawns a JSON-RPC server process, speaks newline-delimited JSON over its
//! stdin/stdout, and exposes request/response correlation over HTTP.

pub mod config;
pub mod correlator;
pub mod errors;
pub mod http;
pub mod stdio;
pub mod supervisor;

pub use config::BridgeConfig;
pub use errors::{AppError, Result};
