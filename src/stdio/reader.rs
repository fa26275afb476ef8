//! Stdout reader task.
//!
//! Drives a [`FramedRead`] over the server's stdout using [`NdjsonCodec`]
//! and hands every complete line to [`Correlator::dispatch`]. Partial lines
//! are buffered by the codec; a trailing line without a newline is flushed
//! when the stream reaches EOF.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::correlator::Correlator;
use crate::stdio::codec::NdjsonCodec;
use crate::AppError;

/// Read NDJSON lines from `stdout` until EOF, an I/O error, or cancellation.
///
/// Oversized lines are logged and skipped; they do not stop the task.
/// Process exit is detected by the supervisor, not here, so reaching EOF
/// simply ends the task.
pub async fn run_reader<R>(stdout: R, correlator: Arc<Correlator>, cancel: CancellationToken)
where
    R: AsyncRead + Unpin + Send,
{
    let mut framed = FramedRead::new(stdout, NdjsonCodec::new());

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!("stdio reader: cancellation received, stopping");
                break;
            }

            item = framed.next() => {
                match item {
                    None => {
                        debug!("stdio reader: EOF on server stdout");
                        break;
                    }
                    Some(Err(AppError::Protocol(ref msg))) => {
                        warn!(error = msg.as_str(), "stdio reader: framing error, skipping line");
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "stdio reader: IO error, stopping");
                        break;
                    }
                    Some(Ok(line)) => {
                        correlator.dispatch(&line).await;
                    }
                }
            }
        }
    }
}
