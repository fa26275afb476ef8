//! MCP server process supervision.
//!
//! Keeps exactly one server process alive for the lifetime of the bridge:
//!
//! 1. **Launch**: ask the [`Launcher`] for a process, start the stdio
//!    reader/writer tasks, attach the writer to the [`Correlator`].
//! 2. **Handshake**: run [`handshake::bootstrap`]; only then is the state
//!    [`ProcessState::Ready`].
//! 3. **Exit**: mark the state [`ProcessState::Dead`], reject every
//!    pending request, wait the restart backoff, go to 1.
//!
//! State changes are computed by [`ProcessState::next`] and published on a
//! [`watch`] channel so the HTTP layer can read them without locking.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::correlator::Correlator;
use crate::stdio::handshake;
use crate::stdio::reader::run_reader;
use crate::stdio::spawner::{Launcher, ProcessExit, ServerProcess};
use crate::stdio::writer::run_writer;
use crate::{AppError, Result};

/// Capacity of the outbound envelope queue feeding the writer task.
const WRITER_QUEUE: usize = 256;

/// Lifecycle state of the supervised server process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Process launched (or being launched), handshake not complete.
    Starting,
    /// Handshake complete; requests are accepted.
    Ready,
    /// No live process.
    Dead,
}

/// Events driving [`ProcessState`] transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessEvent {
    /// A launch attempt begins.
    Launch,
    /// The launcher could not start a process.
    LaunchFailed,
    /// `initialize` answered and `initialized` sent.
    HandshakeCompleted,
    /// The process exited or was killed.
    Exited,
}

impl ProcessState {
    /// Transition table. Events that do not apply to the current state
    /// leave it unchanged.
    #[must_use]
    pub fn next(self, event: ProcessEvent) -> Self {
        match (self, event) {
            (Self::Dead, ProcessEvent::Launch) => Self::Starting,
            (Self::Starting, ProcessEvent::HandshakeCompleted) => Self::Ready,
            (Self::Starting, ProcessEvent::LaunchFailed)
            | (Self::Starting | Self::Ready, ProcessEvent::Exited) => Self::Dead,
            (state, _) => state,
        }
    }

    /// Whether requests may be forwarded.
    #[must_use]
    pub fn is_ready(self) -> bool {
        self == Self::Ready
    }
}

/// A live, handshaken server process.
struct Running {
    process: Box<dyn ServerProcess>,
    io_cancel: CancellationToken,
}

enum Wake {
    Exited(ProcessExit),
    Shutdown,
}

/// Owner of the server process lifecycle.
pub struct Supervisor {
    launcher: Arc<dyn Launcher>,
    correlator: Arc<Correlator>,
    client_name: String,
    backoff: Duration,
    state: watch::Sender<ProcessState>,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("client_name", &self.client_name)
            .field("backoff", &self.backoff)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Supervisor {
    /// Create a supervisor in the [`ProcessState::Dead`] state.
    #[must_use]
    pub fn new(
        launcher: Arc<dyn Launcher>,
        correlator: Arc<Correlator>,
        client_name: impl Into<String>,
        backoff: Duration,
    ) -> Self {
        let (state, _) = watch::channel(ProcessState::Dead);
        Self {
            launcher,
            correlator,
            client_name: client_name.into(),
            backoff,
            state,
        }
    }

    /// Current process state.
    #[must_use]
    pub fn state(&self) -> ProcessState {
        *self.state.borrow()
    }

    /// Subscribe to state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ProcessState> {
        self.state.subscribe()
    }

    /// Correlator the supervised process is attached to.
    #[must_use]
    pub fn correlator(&self) -> &Arc<Correlator> {
        &self.correlator
    }

    /// Launch the first process, complete its handshake, then keep it
    /// alive in a background task until `cancel` fires.
    ///
    /// On cancellation the background task kills the live process and
    /// rejects pending requests before finishing.
    ///
    /// # Errors
    ///
    /// - [`AppError::Spawn`]: the first process could not be started.
    /// - [`AppError::Bootstrap`]: its handshake failed.
    pub async fn start(self: &Arc<Self>, cancel: CancellationToken) -> Result<JoinHandle<()>> {
        let running = self.launch_once(&cancel).await?;
        let this = Arc::clone(self);
        Ok(tokio::spawn(async move { this.supervise(running, cancel).await }))
    }

    async fn supervise(&self, mut running: Running, cancel: CancellationToken) {
        loop {
            let wake = tokio::select! {
                exit = running.process.wait() => Wake::Exited(exit),
                () = cancel.cancelled() => Wake::Shutdown,
            };

            let exit = match wake {
                Wake::Shutdown => {
                    self.stop(running).await;
                    return;
                }
                Wake::Exited(exit) => exit,
            };

            running.io_cancel.cancel();
            self.transition(ProcessEvent::Exited);
            let rejected = self.correlator.disconnect().await;
            warn!(
                exit_code = exit.code,
                reason = %exit.reason,
                rejected,
                backoff = ?self.backoff,
                "MCP server process exited; restarting"
            );

            running = loop {
                tokio::select! {
                    () = tokio::time::sleep(self.backoff) => {}
                    () = cancel.cancelled() => {
                        info!("supervisor: shutdown during restart backoff");
                        return;
                    }
                }

                match self.launch_once(&cancel).await {
                    Ok(next) => break next,
                    Err(err @ AppError::Spawn(_)) => {
                        error!(%err, "MCP server relaunch failed; supervisor giving up");
                        return;
                    }
                    Err(err) if cancel.is_cancelled() => {
                        info!(%err, "supervisor: restart abandoned on shutdown");
                        return;
                    }
                    Err(err) => {
                        error!(%err, "MCP server restart failed; retrying after backoff");
                    }
                }
            };
        }
    }

    /// Launch one process, wire its stdio, and run the handshake.
    async fn launch_once(&self, cancel: &CancellationToken) -> Result<Running> {
        self.transition(ProcessEvent::Launch);

        let launched = match self.launcher.launch() {
            Ok(launched) => launched,
            Err(err) => {
                self.transition(ProcessEvent::LaunchFailed);
                return Err(err);
            }
        };

        let io_cancel = cancel.child_token();
        let (msg_tx, msg_rx) = mpsc::channel(WRITER_QUEUE);

        let writer_cancel = io_cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = run_writer(launched.stdin, msg_rx, writer_cancel).await {
                warn!(%err, "stdio writer stopped with error");
            }
        });
        tokio::spawn(run_reader(
            launched.stdout,
            Arc::clone(&self.correlator),
            io_cancel.clone(),
        ));
        self.correlator.attach(msg_tx).await;

        let mut running = Running {
            process: launched.process,
            io_cancel,
        };

        let handshake = tokio::select! {
            result = handshake::bootstrap(&self.correlator, &self.client_name) => result.map(|_| ()),
            exit = running.process.wait() => Err(AppError::Bootstrap(format!(
                "server exited during handshake: {}",
                exit.reason
            ))),
            () = cancel.cancelled() => Err(AppError::Disconnected(
                "shutdown requested during handshake".into(),
            )),
        };

        match handshake {
            Ok(()) => {
                self.transition(ProcessEvent::HandshakeCompleted);
                Ok(running)
            }
            Err(err) => {
                self.stop(running).await;
                Err(err)
            }
        }
    }

    /// Kill the process, stop its stdio tasks, and fail pending requests.
    async fn stop(&self, mut running: Running) {
        running.process.kill().await;
        running.io_cancel.cancel();
        self.transition(ProcessEvent::Exited);
        let rejected = self.correlator.disconnect().await;
        info!(rejected, "MCP server process stopped");
    }

    fn transition(&self, event: ProcessEvent) {
        self.state.send_if_modified(|state| {
            let next = state.next(event);
            if next == *state {
                return false;
            }
            info!(from = ?*state, to = ?next, ?event, "MCP server state changed");
            *state = next;
            true
        });
    }
}
