//! Request/response correlation over a single NDJSON stream.
//!
//! Every outbound request gets an id from a process-wide monotonically
//! increasing counter and a slot in the pending table. The reader task feeds
//! each inbound line to [`Correlator::dispatch`], which completes the slot
//! whose id matches. Responses may arrive in any order.
//!
//! # Exactly-once resolution
//!
//! A pending request can end three ways: a response, a timeout, or a
//! disconnect. Removal from the pending table is the commit point: whoever
//! removes the entry decides the outcome, and the other parties find nothing
//! to remove and do nothing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, warn};

use crate::stdio::envelope::{parse_responses, RequestEnvelope};
use crate::{AppError, Result};

/// Outcome written into a pending request's slot.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The server answered; carries the full response envelope.
    Resolved(Value),
    /// The server process went away before answering.
    Disconnected,
}

/// Pending requests keyed by correlation id.
type PendingTable = Arc<Mutex<HashMap<u64, oneshot::Sender<Outcome>>>>;

/// Correlates outbound requests with inbound responses.
///
/// Constructed once per host process and shared via `Arc` between the HTTP
/// handlers, the handshake, and the stdio reader task. The outbound side is
/// an `mpsc` channel owned by the writer task of the currently attached
/// server process, so only that task ever touches the child's stdin.
#[derive(Debug)]
pub struct Correlator {
    next_id: AtomicU64,
    pending: PendingTable,
    writer: Mutex<Option<mpsc::Sender<Value>>>,
    timeout: Duration,
}

impl Correlator {
    /// Create a correlator with the given response window.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            next_id: AtomicU64::new(0),
            pending: Arc::new(Mutex::new(HashMap::new())),
            writer: Mutex::new(None),
            timeout,
        }
    }

    /// Attach the writer channel of a freshly launched server process.
    ///
    /// Any previously attached writer is dropped, which stops its task.
    pub async fn attach(&self, writer: mpsc::Sender<Value>) {
        *self.writer.lock().await = Some(writer);
        debug!("correlator: writer attached");
    }

    /// Detach the writer and reject every pending request with
    /// [`Outcome::Disconnected`].
    ///
    /// Returns the number of requests that were rejected.
    pub async fn disconnect(&self) -> usize {
        self.writer.lock().await.take();

        let drained: Vec<_> = self.pending.lock().await.drain().collect();
        let count = drained.len();
        for (id, slot) in drained {
            if slot.send(Outcome::Disconnected).is_err() {
                debug!(id, "correlator: caller gone before disconnect delivered");
            }
        }

        if count > 0 {
            warn!(count, "correlator: pending requests rejected on disconnect");
        }
        count
    }

    /// Number of requests currently awaiting a response.
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Send a request and wait for its response envelope.
    ///
    /// The returned envelope is passed through verbatim; an `error` member
    /// in it is not turned into an `Err` here.
    ///
    /// # Errors
    ///
    /// - [`AppError::Disconnected`]: no server process is attached, or it
    ///   exited before answering.
    /// - [`AppError::Timeout`]: no response within the window given to [`Correlator::new`].
    /// - [`AppError::Protocol`]: the envelope could not be serialised.
    pub async fn send(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let envelope = RequestEnvelope::request(id, method, params).to_value()?;

        let (slot, mut rx) = oneshot::channel();
        self.pending.lock().await.insert(id, slot);

        if let Err(err) = self.enqueue(envelope).await {
            self.pending.lock().await.remove(&id);
            return Err(err);
        }
        debug!(id, method, "correlator: request sent");

        match tokio::time::timeout(self.timeout, &mut rx).await {
            Ok(Ok(outcome)) => outcome_to_result(id, method, outcome),
            // Slot dropped without a value: the table was torn down.
            Ok(Err(_)) => Err(AppError::Disconnected(format!(
                "request {id} ('{method}') abandoned"
            ))),
            Err(_elapsed) => {
                if self.pending.lock().await.remove(&id).is_some() {
                    debug!(id, method, "correlator: request timed out");
                    return Err(AppError::Timeout {
                        method: method.to_owned(),
                        after: self.timeout,
                    });
                }
                // Lost the removal race: the outcome is already in the slot.
                match rx.try_recv() {
                    Ok(outcome) => outcome_to_result(id, method, outcome),
                    Err(_) => Err(AppError::Disconnected(format!(
                        "request {id} ('{method}') abandoned"
                    ))),
                }
            }
        }
    }

    /// Send a notification; no response is expected or tracked.
    ///
    /// # Errors
    ///
    /// - [`AppError::Disconnected`]: no server process is attached.
    /// - [`AppError::Protocol`]: the envelope could not be serialised.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        let envelope = RequestEnvelope::notification(method, params).to_value()?;
        self.enqueue(envelope).await?;
        debug!(method, "correlator: notification sent");
        Ok(())
    }

    /// Route one inbound line to the callers waiting on it.
    ///
    /// Lines that are not JSON, JSON values that are not responses, and
    /// responses whose id is unknown (already timed out, or never ours) are
    /// dropped. Returns the number of pending requests resolved.
    pub async fn dispatch(&self, line: &str) -> usize {
        let responses = parse_responses(line);
        if responses.is_empty() {
            if !line.trim().is_empty() {
                debug!(raw = line, "correlator: non-response line dropped");
            }
            return 0;
        }

        let mut resolved = 0;
        for response in responses {
            let id = response.id();
            let slot = self.pending.lock().await.remove(&id);
            match slot {
                Some(slot) => {
                    if slot.send(Outcome::Resolved(response.into_value())).is_err() {
                        debug!(id, "correlator: caller gone before response delivered");
                    }
                    resolved += 1;
                }
                None => debug!(id, "correlator: response for unknown id dropped"),
            }
        }
        resolved
    }

    async fn enqueue(&self, envelope: Value) -> Result<()> {
        let writer = self
            .writer
            .lock()
            .await
            .clone()
            .ok_or_else(|| AppError::Disconnected("MCP server is not running".into()))?;

        writer
            .send(envelope)
            .await
            .map_err(|_| AppError::Disconnected("MCP server stdin is closed".into()))
    }
}

fn outcome_to_result(id: u64, method: &str, outcome: Outcome) -> Result<Value> {
    match outcome {
        Outcome::Resolved(value) => Ok(value),
        Outcome::Disconnected => Err(AppError::Disconnected(format!(
            "MCP server exited before answering request {id} ('{method}')"
        ))),
    }
}
