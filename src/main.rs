#![forbid(unsafe_code)]

//! `mcp-stdio-bridge`: HTTP bridge binary for a stdio MCP server.
//!
//! Loads configuration, launches and initializes the MCP server process,
//! then serves `POST /mcp` and `GET /health` until SIGTERM or Ctrl-C.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use mcp_stdio_bridge::correlator::Correlator;
use mcp_stdio_bridge::http::{self, BridgeState};
use mcp_stdio_bridge::stdio::spawner::{ProcessLauncher, SpawnConfig};
use mcp_stdio_bridge::supervisor::Supervisor;
use mcp_stdio_bridge::{AppError, BridgeConfig, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "mcp-stdio-bridge", about = "HTTP bridge for stdio MCP servers", version, long_about = None)]
struct Cli {
    /// Optional TOML configuration file; environment variables override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the HTTP listen port.
    #[arg(long)]
    port: Option<u16>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("mcp-stdio-bridge bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = match &args.config {
        Some(path) => BridgeConfig::load_from_path(path)?,
        None => BridgeConfig::default(),
    };
    config.apply_env_overrides(|key| std::env::var(key).ok())?;
    if let Some(port) = args.port {
        config.http_port = port;
    }
    info!(
        memory_dir = %config.memory_dir.display(),
        server_path = %config.server_path.display(),
        "configuration loaded"
    );

    let addr: SocketAddr = format!("{}:{}", config.http_host, config.http_port)
        .parse()
        .map_err(|err| AppError::Config(format!("invalid listen address: {err}")))?;

    // ── Start and initialize the MCP server ─────────────
    let correlator = Arc::new(Correlator::new(config.timeouts.request_timeout()));
    let launcher = Arc::new(ProcessLauncher::new(SpawnConfig::from(&config)));
    let supervisor = Arc::new(Supervisor::new(
        launcher,
        correlator,
        config.client_name.clone(),
        config.timeouts.restart_backoff(),
    ));

    let ct = CancellationToken::new();
    let supervisor_handle = supervisor.start(ct.clone()).await.map_err(|err| {
        error!(%err, "failed to initialize MCP server");
        err
    })?;

    // ── Start HTTP transport ────────────────────────────
    let listener = http::bind(addr).await?;
    let state = BridgeState {
        supervisor: Arc::clone(&supervisor),
        memory_dir: config.memory_dir.clone(),
    };
    let http_ct = ct.clone();
    let http_handle = tokio::spawn(async move {
        if let Err(err) = http::serve(listener, state, http_ct).await {
            error!(%err, "HTTP transport failed");
        }
    });

    // ── Wait for shutdown signal ────────────────────────
    shutdown_signal().await;
    info!("shutting down");
    ct.cancel();

    let _ = tokio::join!(supervisor_handle, http_handle);
    info!("mcp-stdio-bridge shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter).with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
