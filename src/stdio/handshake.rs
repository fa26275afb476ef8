//! MCP initialization handshake.
//!
//! Before a server accepts tool calls it must see:
//!
//! 1. an `initialize` request announcing the protocol version and client
//!    identity, answered by the server, then
//! 2. a `notifications/initialized` notification, which is never answered.
//!
//! Both go through the [`Correlator`] so the `initialize` response is
//! matched the same way as any other request.

use serde_json::{json, Value};
use tracing::{debug, info};

use crate::correlator::Correlator;
use crate::stdio::envelope::ResponseEnvelope;
use crate::{AppError, Result};

/// MCP protocol revision requested in `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Method of the handshake request.
pub const INITIALIZE: &str = "initialize";

/// Method of the handshake acknowledgement.
pub const INITIALIZED: &str = "notifications/initialized";

/// Build the `initialize` params for `client_name`.
#[must_use]
pub fn initialize_params(client_name: &str) -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": client_name,
            "version": env!("CARGO_PKG_VERSION")
        }
    })
}

/// Run the `initialize` / `notifications/initialized` exchange.
///
/// Returns the server's `initialize` response envelope.
///
/// # Errors
///
/// Returns [`AppError::Bootstrap`] when the request times out, the server
/// disconnects, the response carries an `error` member, or the
/// acknowledgement cannot be written.
pub async fn bootstrap(correlator: &Correlator, client_name: &str) -> Result<Value> {
    let response = correlator
        .send(INITIALIZE, initialize_params(client_name))
        .await
        .map_err(|e| AppError::Bootstrap(format!("initialize failed: {e}")))?;

    if let Some(envelope) = ResponseEnvelope::from_value(response.clone()) {
        if envelope.is_error() {
            return Err(AppError::Bootstrap(format!(
                "initialize rejected by server: {}",
                envelope.error_message().unwrap_or("unknown error")
            )));
        }
    }
    debug!("handshake: initialize answered");

    correlator
        .notify(INITIALIZED, None)
        .await
        .map_err(|e| AppError::Bootstrap(format!("initialized notification failed: {e}")))?;

    let server = response
        .pointer("/result/serverInfo/name")
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    info!(server, "MCP server initialized");

    Ok(response)
}
