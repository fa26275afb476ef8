//! Stdin writer task.
//!
//! The only owner of the server's stdin. Receives envelopes from the
//! correlator over an [`mpsc`] channel and writes each one as a compact
//! JSON line, preserving the order in which they were enqueued.

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{AppError, Result};

/// Write queued envelopes to `stdin` until the channel closes or `cancel`
/// fires.
///
/// # Errors
///
/// - [`AppError::Protocol`]`("failed to serialise outbound message: …")`.
/// - [`AppError::Io`]`("write failed: …")` if the server closed its stdin.
pub async fn run_writer<W>(
    stdin: W,
    mut msg_rx: mpsc::Receiver<serde_json::Value>,
    cancel: CancellationToken,
) -> Result<()>
where
    W: AsyncWrite + Unpin + Send,
{
    let mut stdin = stdin;

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!("stdio writer: cancellation received, stopping");
                break;
            }

            msg = msg_rx.recv() => {
                let Some(value) = msg else {
                    debug!("stdio writer: message channel closed, stopping");
                    break;
                };

                let mut bytes = serde_json::to_vec(&value).map_err(|e| {
                    AppError::Protocol(format!("failed to serialise outbound message: {e}"))
                })?;
                bytes.push(b'\n');

                if let Err(e) = write_line(&mut stdin, &bytes).await {
                    warn!(error = %e, "stdio writer: write to stdin failed");
                    return Err(AppError::Io(format!("write failed: {e}")));
                }
            }
        }
    }

    Ok(())
}

async fn write_line<W>(stdin: &mut W, bytes: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    stdin.write_all(bytes).await?;
    stdin.flush().await
}
