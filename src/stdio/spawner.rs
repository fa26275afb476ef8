//! MCP server process spawner.
//!
//! The supervisor never spawns processes directly; it asks a [`Launcher`]
//! for a [`Launched`] handle. [`ProcessLauncher`] is the production
//! implementation: it runs the configured command with
//! - the server directory as its working directory,
//! - the parent's environment plus `MEMORY_DIR`,
//! - stdin/stdout piped for NDJSON and stderr inherited unmodified,
//! - `kill_on_drop(true)` so a dropped handle never leaks a process.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tracing::{info, warn};

use crate::config::{BridgeConfig, ENV_MEMORY_DIR};
use crate::{AppError, Result};

/// Readable end of the server's stdout.
pub type ServerStdout = Box<dyn AsyncRead + Send + Unpin>;
/// Writable end of the server's stdin.
pub type ServerStdin = Box<dyn AsyncWrite + Send + Unpin>;

/// How a server process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessExit {
    /// Exit code, `None` when terminated by a signal or unknown.
    pub code: Option<i32>,
    /// Human-readable reason for logs.
    pub reason: String,
}

impl ProcessExit {
    /// Exit with a known status code.
    #[must_use]
    pub fn with_code(code: i32) -> Self {
        Self {
            code: Some(code),
            reason: format!("process exited with code {code}"),
        }
    }
}

/// Lifecycle half of a launched server: exit detection and termination.
pub trait ServerProcess: Send {
    /// Resolve once the process has exited.
    fn wait(&mut self) -> Pin<Box<dyn Future<Output = ProcessExit> + Send + '_>>;

    /// Terminate the process. Best effort; failures are logged.
    fn kill(&mut self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// A freshly launched server with its stdio captured.
pub struct Launched {
    /// Server stdin; JSON-RPC requests go here.
    pub stdin: ServerStdin,
    /// Server stdout; JSON-RPC responses come from here.
    pub stdout: ServerStdout,
    /// Exit detection and kill handle.
    pub process: Box<dyn ServerProcess>,
}

/// Something that can start a server process.
pub trait Launcher: Send + Sync {
    /// Start one server process.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Spawn`] if the process cannot be started or its
    /// stdio cannot be captured.
    fn launch(&self) -> Result<Launched>;
}

/// Configuration for spawning the MCP server process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnConfig {
    /// Executable, e.g. `node`.
    pub command: String,
    /// Arguments, e.g. `["dist/index.js"]`.
    pub args: Vec<String>,
    /// Working directory of the process.
    pub working_dir: PathBuf,
    /// Exported to the process as `MEMORY_DIR`.
    pub memory_dir: PathBuf,
}

impl From<&BridgeConfig> for SpawnConfig {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            command: config.server_command.clone(),
            args: config.server_args.clone(),
            working_dir: config.server_path.clone(),
            memory_dir: config.memory_dir.clone(),
        }
    }
}

/// [`Launcher`] backed by [`tokio::process::Command`].
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    config: SpawnConfig,
}

impl ProcessLauncher {
    /// Create a launcher for `config`.
    #[must_use]
    pub fn new(config: SpawnConfig) -> Self {
        Self { config }
    }
}

impl Launcher for ProcessLauncher {
    fn launch(&self) -> Result<Launched> {
        let config = &self.config;
        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .env(ENV_MEMORY_DIR, &config.memory_dir)
            .current_dir(&config.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|err| {
            AppError::Spawn(format!(
                "failed to spawn '{}' in {}: {err}",
                config.command,
                config.working_dir.display()
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| AppError::Spawn("failed to capture server stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::Spawn("failed to capture server stdout".into()))?;

        info!(
            pid = child.id(),
            command = %config.command,
            working_dir = %config.working_dir.display(),
            memory_dir = %config.memory_dir.display(),
            "MCP server process started"
        );

        Ok(Launched {
            stdin: Box::new(stdin),
            stdout: Box::new(stdout),
            process: Box::new(ChildProcess(child)),
        })
    }
}

struct ChildProcess(Child);

impl ServerProcess for ChildProcess {
    fn wait(&mut self) -> Pin<Box<dyn Future<Output = ProcessExit> + Send + '_>> {
        Box::pin(async move {
            match self.0.wait().await {
                Ok(status) => status.code().map_or_else(
                    || ProcessExit {
                        code: None,
                        reason: "process terminated by signal".to_owned(),
                    },
                    ProcessExit::with_code,
                ),
                Err(err) => {
                    warn!(%err, "error waiting for MCP server process");
                    ProcessExit {
                        code: None,
                        reason: format!("wait error: {err}"),
                    }
                }
            }
        })
    }

    fn kill(&mut self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            if let Err(err) = self.0.kill().await {
                warn!(%err, "failed to kill MCP server process");
            }
        })
    }
}
